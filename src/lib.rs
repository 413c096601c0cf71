// src/lib.rs
// orbit-chaos - perturbation sensitivity of move-sequence orbit periods

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod batch;
pub mod config;
pub mod error;
pub mod exponent;
pub mod oracle;
pub mod perturb;
pub mod report;
pub mod sequence;
pub mod store;

pub use error::{OrbitError, Result};
