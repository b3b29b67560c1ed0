pub mod plan;
pub mod sample;
