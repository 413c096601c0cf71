// src/oracle/scripted.rs
// Scripted oracle for tests and dry runs

use super::{OracleRequest, OracleResponse, PeriodOracle};
use crate::error::{OrbitError, Result};
use crate::sequence::MoveSequence;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the scripted oracle answers for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Period(u64),
    Exhausted,
    Unavailable,
}

type OutcomeFn = Box<dyn Fn(&MoveSequence) -> ScriptedOutcome + Send + Sync>;

/// Answers from a script instead of running an engine.
///
/// Lookup order: outcomes pinned to a sequence, then the FIFO queue, then the
/// fallback function. Anything left over is reported as unavailable.
#[derive(Default)]
pub struct ScriptedOracle {
    pinned: HashMap<MoveSequence, ScriptedOutcome>,
    queue: Mutex<VecDeque<ScriptedOutcome>>,
    fallback: Option<OutcomeFn>,
    queries: AtomicUsize,
    history: Mutex<Vec<MoveSequence>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `outcome` for this exact sequence
    pub fn with(mut self, sequence: MoveSequence, outcome: ScriptedOutcome) -> Self {
        self.pinned.insert(sequence, outcome);
        self
    }

    pub fn with_period(self, sequence: MoveSequence, period: u64) -> Self {
        self.with(sequence, ScriptedOutcome::Period(period))
    }

    /// Queue outcomes for unpinned sequences, consumed in query order
    pub fn then(self, outcomes: impl IntoIterator<Item = ScriptedOutcome>) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(outcomes);
        self
    }

    pub fn then_periods(self, periods: impl IntoIterator<Item = u64>) -> Self {
        self.then(periods.into_iter().map(ScriptedOutcome::Period))
    }

    /// Answer anything else through `f`
    pub fn otherwise<F>(mut self, f: F) -> Self
    where
        F: Fn(&MoveSequence) -> ScriptedOutcome + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(f));
        self
    }

    /// Number of queries received so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Every queried sequence, in arrival order
    pub fn history(&self) -> Vec<MoveSequence> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_outcome(&self, sequence: &MoveSequence) -> Option<ScriptedOutcome> {
        if let Some(outcome) = self.pinned.get(sequence) {
            return Some(*outcome);
        }
        if let Some(outcome) = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Some(outcome);
        }
        self.fallback.as_ref().map(|f| f(sequence))
    }
}

#[async_trait]
impl PeriodOracle for ScriptedOracle {
    async fn query(&self, request: &OracleRequest) -> Result<OracleResponse> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.sequence.clone());

        match self.next_outcome(&request.sequence) {
            Some(ScriptedOutcome::Period(period)) if period > 0 => Ok(OracleResponse {
                period,
                states_visited: period,
                elapsed: Duration::ZERO,
            }),
            Some(ScriptedOutcome::Period(_)) => Err(OrbitError::OracleUnavailable(
                "scripted period 0".to_string(),
            )),
            Some(ScriptedOutcome::Exhausted) => Err(OrbitError::OracleExhausted {
                sequence: request.sequence.to_string(),
                max_iterations: request.max_iterations,
            }),
            Some(ScriptedOutcome::Unavailable) => Err(OrbitError::OracleUnavailable(format!(
                "scripted outage for {}",
                request.sequence
            ))),
            None => Err(OrbitError::OracleUnavailable(format!(
                "no scripted outcome for {}",
                request.sequence
            ))),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(names: &[&str]) -> MoveSequence {
        MoveSequence::from_names(names).unwrap()
    }

    fn req(names: &[&str]) -> OracleRequest {
        OracleRequest::new(seq(names), 1_000)
    }

    #[tokio::test]
    async fn test_pinned_outcomes_are_stable() {
        let oracle = ScriptedOracle::new().with_period(seq(&["FR"]), 8);
        for _ in 0..3 {
            assert_eq!(oracle.query(&req(&["FR"])).await.unwrap().period, 8);
        }
        assert_eq!(oracle.query_count(), 3);
    }

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let oracle = ScriptedOracle::new()
            .then([ScriptedOutcome::Period(4), ScriptedOutcome::Exhausted])
            .otherwise(|s| ScriptedOutcome::Period(s.len() as u64 * 10));

        assert_eq!(oracle.query(&req(&["UF"])).await.unwrap().period, 4);
        assert!(matches!(
            oracle.query(&req(&["UF"])).await,
            Err(OrbitError::OracleExhausted { .. })
        ));
        assert_eq!(oracle.query(&req(&["UF", "OR"])).await.unwrap().period, 20);
        assert_eq!(oracle.history().len(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_is_unavailable() {
        let oracle = ScriptedOracle::new();
        assert!(matches!(
            oracle.query(&req(&["FR"])).await,
            Err(OrbitError::OracleUnavailable(_))
        ));
    }
}
