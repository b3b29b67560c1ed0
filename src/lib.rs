//! # Multi-view video diffusion sampling
//!
//! Interleaved multi-view/multi-frame sampling (SV4D) using [Burn](https://github.com/tracel-ai/burn).
//! The pretrained networks are reached through [`oracle::DiffusionOracle`];
//! this crate decides which `(frame, view)` slots every call synthesizes.

pub mod camera;
pub mod error;
pub mod grid;
pub mod media;
pub mod oracle;
pub mod pipelines;
pub mod schedule;
pub mod schedulers;
pub mod utils;

pub use error::{Sv4dError, Sv4dResult};

#[cfg(test)]
use burn::backend::ndarray;

#[cfg(test)]
pub type TestBackend = ndarray::NdArray<f32>;
