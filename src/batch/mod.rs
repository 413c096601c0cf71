//! Batch orchestration of exponent computations.
//!
//! A batch run:
//! 1. Validates every submitted sequence against the alphabet
//! 2. Collapses duplicates and skips sequences the store already holds
//! 3. Runs the rest through the exponent computer on a bounded worker pool
//! 4. Persists each finished record and reports successes and failures
//!
//! One sequence failing never stops its siblings. Cancellation (explicit or
//! through the batch timeout) abandons in-flight work; nothing is persisted for
//! an abandoned sequence.

use crate::error::Result;
use crate::exponent::{ExponentComputer, SequenceExponentRecord};
use crate::sequence::{Alphabet, MoveSequence};
use crate::store::RecordStore;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for a batch run
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Sequences analysed concurrently
    pub workers: usize,
    /// Cancel whatever is still running after this long
    pub timeout: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout: None,
        }
    }
}

/// A sequence that produced no record, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub sequence: MoveSequence,
    pub reason: String,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sequence, self.reason)
    }
}

/// Everything a batch run produced. Order within each list is not meaningful.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Records computed and persisted by this run
    pub records: Vec<SequenceExponentRecord>,
    pub failures: Vec<BatchFailure>,
    /// Already in the store before the run started
    pub skipped: Vec<MoveSequence>,
    /// Cancelled before finishing; nothing persisted
    pub abandoned: Vec<MoveSequence>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.abandoned.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} computed, {} failed, {} skipped, {} abandoned",
            self.records.len(),
            self.failures.len(),
            self.skipped.len(),
            self.abandoned.len()
        )
    }
}

/// Result of one scheduled sequence
enum ItemOutcome {
    Done(SequenceExponentRecord),
    Failed(String),
    Abandoned,
}

/// Runs the per-sequence pipeline over many sequences
pub struct BatchOrchestrator {
    computer: Arc<ExponentComputer>,
    store: Arc<dyn RecordStore>,
    alphabet: Alphabet,
    config: BatchConfig,
}

impl BatchOrchestrator {
    /// `alphabet` is what submitted sequences are validated against
    pub fn new(
        computer: Arc<ExponentComputer>,
        store: Arc<dyn RecordStore>,
        alphabet: Alphabet,
        config: BatchConfig,
    ) -> Self {
        Self {
            computer,
            store,
            alphabet,
            config,
        }
    }

    /// Analyse `sequences`. Only failing to read the store's keys aborts the
    /// run; every per-sequence problem lands in `BatchOutcome::failures`.
    pub async fn run(
        &self,
        sequences: Vec<MoveSequence>,
        cancel: CancellationToken,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let submitted = sequences.len();

        // Validate and dedupe before anything touches the oracle
        let stored = self.store.keys().await?;
        let mut seen = HashSet::new();
        let mut pending: Vec<(usize, MoveSequence)> = Vec::new();

        for (run_index, sequence) in sequences.into_iter().enumerate() {
            if let Err(e) = self.alphabet.validate(&sequence) {
                warn!(sequence = %sequence, error = %e, "Rejecting sequence");
                outcome.failures.push(BatchFailure {
                    sequence,
                    reason: e.to_string(),
                });
                continue;
            }
            if !seen.insert(sequence.clone()) {
                debug!(sequence = %sequence, "Duplicate in submission, collapsed");
                continue;
            }
            if stored.contains(&sequence) {
                debug!(sequence = %sequence, "Already stored, skipping");
                outcome.skipped.push(sequence);
                continue;
            }
            pending.push((run_index, sequence));
        }

        let workers = self.config.workers.max(1);
        info!(
            submitted,
            pending = pending.len(),
            skipped = outcome.skipped.len(),
            rejected = outcome.failures.len(),
            workers,
            "Starting batch"
        );

        if pending.is_empty() {
            return Ok(outcome);
        }

        // Child token: the batch timeout must not cancel the caller's token
        let token = cancel.child_token();
        let timer = self.config.timeout.map(|limit| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        warn!(timeout_secs = limit.as_secs_f64(), "Batch timed out, cancelling");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        let results = stream::iter(pending)
            .map(|(run_index, sequence)| {
                let computer = Arc::clone(&self.computer);
                let store = Arc::clone(&self.store);
                let token = token.clone();
                async move {
                    let item = run_item(&computer, store.as_ref(), &sequence, run_index, &token).await;
                    (sequence, item)
                }
            })
            .buffer_unordered(workers)
            .collect::<Vec<_>>()
            .await;

        if let Some(timer) = timer {
            timer.abort();
        }

        for (sequence, item) in results {
            match item {
                ItemOutcome::Done(record) => outcome.records.push(record),
                ItemOutcome::Failed(reason) => {
                    outcome.failures.push(BatchFailure { sequence, reason })
                }
                ItemOutcome::Abandoned => outcome.abandoned.push(sequence),
            }
        }

        info!(
            computed = outcome.records.len(),
            failed = outcome.failures.len(),
            skipped = outcome.skipped.len(),
            abandoned = outcome.abandoned.len(),
            "Batch finished"
        );

        Ok(outcome)
    }
}

/// Compute and persist one sequence
async fn run_item(
    computer: &ExponentComputer,
    store: &dyn RecordStore,
    sequence: &MoveSequence,
    run_index: usize,
    token: &CancellationToken,
) -> ItemOutcome {
    if token.is_cancelled() {
        return ItemOutcome::Abandoned;
    }

    let computed = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = computer.compute(sequence) => Some(result),
    };

    let record = match computed {
        None => {
            debug!(sequence = %sequence, "Abandoned by cancellation");
            return ItemOutcome::Abandoned;
        }
        Some(Err(e)) => {
            warn!(sequence = %sequence, error = %e, "Sequence failed");
            return ItemOutcome::Failed(e.to_string());
        }
        Some(Ok(record)) => record,
    };

    // Only complete records reach the store
    match store.save(&record, run_index).await {
        Ok(()) => ItemOutcome::Done(record),
        Err(e) => {
            warn!(sequence = %sequence, error = %e, "Failed to persist record");
            ItemOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrbitError;
    use crate::exponent::ExponentConfig;
    use crate::oracle::{OracleRequest, OracleResponse, PeriodOracle, ScriptedOracle, ScriptedOutcome};
    use crate::perturb::PerturbationEngine;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    fn seq(names: &[&str]) -> MoveSequence {
        MoveSequence::from_names(names).unwrap()
    }

    /// Period depends only on the sequence, so concurrency cannot reorder it
    fn stable_oracle() -> ScriptedOracle {
        ScriptedOracle::new().otherwise(|s| ScriptedOutcome::Period(2 + s.to_wire().len() as u64))
    }

    fn orchestrator(
        oracle: Arc<dyn PeriodOracle>,
        store: Arc<dyn RecordStore>,
        config: BatchConfig,
    ) -> BatchOrchestrator {
        let computer = ExponentComputer::new(
            oracle,
            PerturbationEngine::new(Alphabet::common()),
            ExponentConfig {
                perturbations: 3,
                seed: 1,
                ..ExponentConfig::default()
            },
        );
        BatchOrchestrator::new(Arc::new(computer), store, Alphabet::hypercube(), config)
    }

    // ============================================================================
    // Scheduling
    // ============================================================================

    #[tokio::test]
    async fn test_runs_every_sequence() {
        let oracle = Arc::new(stable_oracle());
        let store = Arc::new(MemoryStore::new());
        let batch = orchestrator(oracle.clone(), store.clone(), BatchConfig::default());

        let input = vec![seq(&["FR"]), seq(&["FR", "UF"]), seq(&["OR", "RO", "UF"])];
        let outcome = batch.run(input, CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.records.len(), 3);
        assert!(outcome.failures.is_empty());
        assert!(outcome.is_complete());
        assert_eq!(store.len().await, 3);
        assert_eq!(oracle.query_count(), 3 * 4);
    }

    #[tokio::test]
    async fn test_second_run_queries_nothing() {
        let oracle = Arc::new(stable_oracle());
        let store = Arc::new(MemoryStore::new());
        let batch = orchestrator(oracle.clone(), store.clone(), BatchConfig::default());
        let input = vec![seq(&["FR", "UF"]), seq(&["UF", "OR"])];

        batch.run(input.clone(), CancellationToken::new()).await.unwrap();
        let queries_after_first = oracle.query_count();

        let outcome = batch.run(input, CancellationToken::new()).await.unwrap();
        assert_eq!(oracle.query_count(), queries_after_first);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicates_collapse() {
        let oracle = Arc::new(stable_oracle());
        let store = Arc::new(MemoryStore::new());
        let batch = orchestrator(oracle.clone(), store, BatchConfig::default());

        let outcome = batch
            .run(vec![seq(&["FR"]), seq(&["FR"]), seq(&["FR"])], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(oracle.query_count(), 4);
    }

    // ============================================================================
    // Failure isolation
    // ============================================================================

    #[tokio::test]
    async fn test_invalid_sequence_fails_without_query() {
        let oracle = Arc::new(stable_oracle());
        let store = Arc::new(MemoryStore::new());
        let batch = orchestrator(oracle.clone(), store, BatchConfig::default());

        let outcome = batch
            .run(vec![seq(&["FR", "ZZ"])], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].reason.contains("ZZ"));
        assert_eq!(oracle.query_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_sequence_does_not_stop_siblings() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with(seq(&["FR", "UF"]), ScriptedOutcome::Exhausted)
                .otherwise(|s| ScriptedOutcome::Period(2 + s.len() as u64)),
        );
        let store = Arc::new(MemoryStore::new());
        let batch = orchestrator(oracle, store.clone(), BatchConfig { workers: 2, timeout: None });

        let outcome = batch
            .run(
                vec![seq(&["OR"]), seq(&["FR", "UF"]), seq(&["RO", "UF"])],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].sequence, seq(&["FR", "UF"]));
        assert!(outcome.failures[0].reason.contains("could not be resolved"));
        assert!(!store.contains(&seq(&["FR", "UF"])).await.unwrap());
    }

    // ============================================================================
    // Cancellation
    // ============================================================================

    struct StallingOracle;

    #[async_trait]
    impl PeriodOracle for StallingOracle {
        async fn query(&self, _request: &OracleRequest) -> crate::error::Result<OracleResponse> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(OrbitError::OracleUnavailable("stalled".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cancelled_token_abandons_everything() {
        let oracle = Arc::new(stable_oracle());
        let store = Arc::new(MemoryStore::new());
        let batch = orchestrator(oracle.clone(), store.clone(), BatchConfig::default());

        let token = CancellationToken::new();
        token.cancel();
        let outcome = batch.run(vec![seq(&["FR"]), seq(&["UF"])], token).await.unwrap();

        assert_eq!(outcome.abandoned.len(), 2);
        assert!(!outcome.is_complete());
        assert_eq!(oracle.query_count(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_timeout_abandons_stalled_work() {
        let store = Arc::new(MemoryStore::new());
        let batch = orchestrator(
            Arc::new(StallingOracle),
            store.clone(),
            BatchConfig {
                workers: 2,
                timeout: Some(Duration::from_millis(50)),
            },
        );

        let token = CancellationToken::new();
        let outcome = batch
            .run(vec![seq(&["FR"]), seq(&["UF"]), seq(&["OR"])], token.clone())
            .await
            .unwrap();

        assert_eq!(outcome.abandoned.len(), 3);
        assert!(store.is_empty().await);
        // The caller's token is left alone
        assert!(!token.is_cancelled());
    }
}
