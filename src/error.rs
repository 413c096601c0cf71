// src/error.rs
// Error taxonomy for the perturbation analysis pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the orbit-chaos library
#[derive(Error, Debug)]
pub enum OrbitError {
    /// Malformed input sequence, rejected before any oracle call
    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    /// The oracle hit its iteration budget without resolving a period
    #[error("oracle exhausted {max_iterations} iterations without finding a period for {sequence}")]
    OracleExhausted { sequence: String, max_iterations: u64 },

    /// The oracle could not be reached or produced unusable output
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("base sequence {sequence} could not be resolved: {reason}")]
    BaseSequenceUnresolved { sequence: String, reason: String },

    #[error("all {attempted} perturbations of {sequence} failed")]
    AllPerturbationsFailed { sequence: String, attempted: usize },

    /// A persisted artifact could not be parsed
    #[error("malformed record {}: {reason}", path.display())]
    MalformedRecord { path: PathBuf, reason: String },

    /// A different record is already persisted for the same sequence
    #[error("a different record is already stored for {0}")]
    RecordConflict(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Convenience type alias for Result using OrbitError
pub type Result<T> = std::result::Result<T, OrbitError>;

impl OrbitError {
    /// Oracle failures that only cost one perturbation sample
    pub fn is_sample_failure(&self) -> bool {
        matches!(
            self,
            OrbitError::OracleExhausted { .. } | OrbitError::OracleUnavailable(_)
        )
    }
}
