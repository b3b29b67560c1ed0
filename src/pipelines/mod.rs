//! # Pipelines
//!
//! End-to-end sampling runs built on a [`DiffusionOracle`](crate::oracle::DiffusionOracle).

pub mod sv4d;
