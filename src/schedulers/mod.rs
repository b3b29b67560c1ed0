//! # Noise schedules
//!
//! Discretizations and update rules shared by the oracles.

pub mod edm;

pub use edm::{EdmConfig, EdmScheduler};
