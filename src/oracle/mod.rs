// src/oracle/mod.rs
// Request/response boundary to the external period-finding engine

pub mod process;
pub mod scripted;

use crate::error::Result;
use crate::sequence::MoveSequence;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use process::ProcessOracle;
pub use scripted::{ScriptedOracle, ScriptedOutcome};

/// Default iteration budget per query
pub const DEFAULT_MAX_ITERATIONS: u64 = 50_000;

/// One period query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub sequence: MoveSequence,
    pub max_iterations: u64,
}

impl OracleRequest {
    pub fn new(sequence: MoveSequence, max_iterations: u64) -> Self {
        Self {
            sequence,
            max_iterations,
        }
    }
}

/// A resolved period. `period` is always >= 1; an unresolved query is an
/// error, never a zero period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResponse {
    pub period: u64,
    pub states_visited: u64,
    pub elapsed: Duration,
}

/// The period-finding engine, seen only through its request/response contract.
///
/// Implementations fail with `OracleExhausted` when the budget runs out and
/// `OracleUnavailable` when the engine cannot be reached or answers garbage.
/// Asking again for the same sequence with a budget at least as large as its
/// true period must return the same period.
#[async_trait]
pub trait PeriodOracle: Send + Sync {
    async fn query(&self, request: &OracleRequest) -> Result<OracleResponse>;

    /// Short label for logs
    fn name(&self) -> &str {
        "oracle"
    }
}
