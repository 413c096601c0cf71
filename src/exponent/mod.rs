// src/exponent/mod.rs
// Discrete Lyapunov-like exponent for one base sequence
//
// λ(S) = (1/n) Σ ln( max(P(S), P(S'_i)) / min(P(S), P(S'_i)) )
// over the n perturbations S'_i whose period the oracle resolved.

pub mod classify;
pub mod record;

use crate::error::{OrbitError, Result};
use crate::oracle::{OracleRequest, PeriodOracle, DEFAULT_MAX_ITERATIONS};
use crate::perturb::{PerturbationEngine, PerturbationOperator};
use crate::sequence::MoveSequence;
use rand::SeedableRng;
use rand::rngs::StdRng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use classify::{Classification, Thresholds};
pub use record::{RecordStatistics, SequenceExponentRecord};

/// Period ratio, always >= 1 and exactly 1 iff the periods are equal
pub fn period_ratio(a: u64, b: u64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi as f64 / lo as f64
}

/// Mean log period ratio; `None` without samples
pub fn lyapunov_exponent(base_period: u64, perturbed_periods: &[u64]) -> Option<f64> {
    if perturbed_periods.is_empty() {
        return None;
    }
    let total: f64 = perturbed_periods
        .iter()
        .map(|&p| period_ratio(base_period, p).ln())
        .sum();
    Some(total / perturbed_periods.len() as f64)
}

/// Settings for one exponent computation
#[derive(Debug, Clone)]
pub struct ExponentConfig {
    /// Perturbations requested per base sequence
    pub perturbations: usize,
    pub operator: PerturbationOperator,
    /// Iteration budget handed to the oracle for every query
    pub max_iterations: u64,
    pub thresholds: Thresholds,
    /// Root seed; each base sequence derives its own stream from it
    pub seed: u64,
}

impl Default for ExponentConfig {
    fn default() -> Self {
        Self {
            perturbations: 10,
            operator: PerturbationOperator::Substitute,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            thresholds: Thresholds::default(),
            seed: 0,
        }
    }
}

/// Drives one base sequence plus N perturbations through the oracle
pub struct ExponentComputer {
    oracle: Arc<dyn PeriodOracle>,
    engine: PerturbationEngine,
    config: ExponentConfig,
}

impl ExponentComputer {
    pub fn new(oracle: Arc<dyn PeriodOracle>, engine: PerturbationEngine, config: ExponentConfig) -> Self {
        Self {
            oracle,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &ExponentConfig {
        &self.config
    }

    /// Random stream for a base sequence, independent of scheduling order
    pub fn rng_for(&self, base: &MoveSequence) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(self.config.seed.to_le_bytes());
        hasher.update(base.to_wire().as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        StdRng::seed_from_u64(u64::from_le_bytes(bytes))
    }

    pub async fn compute(&self, base: &MoveSequence) -> Result<SequenceExponentRecord> {
        let mut rng = self.rng_for(base);
        self.compute_with_rng(base, &mut rng).await
    }

    /// Compute with an explicit random source
    pub async fn compute_with_rng(
        &self,
        base: &MoveSequence,
        rng: &mut StdRng,
    ) -> Result<SequenceExponentRecord> {
        let max_iterations = self.config.max_iterations;

        // The exponent is meaningless without the base period
        let base_period = self
            .oracle
            .query(&OracleRequest::new(base.clone(), max_iterations))
            .await
            .map_err(|e| OrbitError::BaseSequenceUnresolved {
                sequence: base.to_string(),
                reason: e.to_string(),
            })?
            .period;
        debug!(
            sequence = %base,
            oracle = self.oracle.name(),
            base_period,
            "Base period resolved"
        );

        let requested = self.config.perturbations;
        let mut perturbed_periods = Vec::with_capacity(requested);

        for i in 0..requested {
            let perturbation = self.engine.perturb_detailed(base, self.config.operator, rng)?;
            if perturbation.applied != perturbation.requested {
                debug!(
                    sequence = %base,
                    requested = %perturbation.requested,
                    applied = %perturbation.applied,
                    "Operator fell back"
                );
            }
            let request = OracleRequest::new(perturbation.sequence, max_iterations);

            match self.oracle.query(&request).await {
                Ok(response) => {
                    debug!(
                        sequence = %base,
                        sample = i + 1,
                        operator = %perturbation.applied,
                        position = perturbation.position,
                        perturbed = %request.sequence,
                        period = response.period,
                        ratio = period_ratio(base_period, response.period),
                        "Perturbation resolved"
                    );
                    perturbed_periods.push(response.period);
                }
                Err(e) if e.is_sample_failure() => {
                    warn!(
                        sequence = %base,
                        oracle = self.oracle.name(),
                        sample = i + 1,
                        perturbed = %request.sequence,
                        error = %e,
                        "Perturbation sample failed, skipping"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if perturbed_periods.is_empty() {
            return Err(OrbitError::AllPerturbationsFailed {
                sequence: base.to_string(),
                attempted: requested,
            });
        }

        let record = SequenceExponentRecord::from_periods(
            base.clone(),
            base_period,
            perturbed_periods,
            &self.config.thresholds,
        )?;

        info!(
            sequence = %base,
            base_period,
            samples = record.perturbations_tested(),
            requested,
            exponent = record.exponent,
            classification = %record.classification,
            "Exponent computed"
        );

        Ok(record)
    }
}
