// src/exponent/record.rs
// Per-sequence exponent record

use super::classify::{Classification, Thresholds};
use super::{lyapunov_exponent, period_ratio};
use crate::error::{OrbitError, Result};
use crate::report::stats;
use crate::sequence::MoveSequence;
use serde::{Deserialize, Serialize};

/// Tolerance when checking stored ratios against recomputed ones
const RATIO_TOLERANCE: f64 = 1e-9;

/// Result of analysing one base sequence.
///
/// Everything except `classification` is write-once; classification can be
/// re-derived from `exponent` at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceExponentRecord {
    pub base_sequence: MoveSequence,
    /// Tokens joined with " → ", for reports
    pub sequence_rendered: String,
    pub base_period: u64,
    /// One entry per successful perturbation
    pub perturbed_periods: Vec<u64>,
    /// `max(base, p) / min(base, p)` for each perturbed period
    pub ratios: Vec<f64>,
    pub exponent: f64,
    pub classification: Classification,
}

/// Derived per-record numbers, persisted next to the record for external tools
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordStatistics {
    pub mean_ratio: f64,
    pub std_ratio: f64,
    pub max_ratio: f64,
    pub mean_divergence: f64,
    pub max_divergence: f64,
}

impl SequenceExponentRecord {
    pub fn from_periods(
        base_sequence: MoveSequence,
        base_period: u64,
        perturbed_periods: Vec<u64>,
        thresholds: &Thresholds,
    ) -> Result<Self> {
        if base_period == 0 || perturbed_periods.contains(&0) {
            return Err(OrbitError::InvalidSequence(format!(
                "periods must be positive for {}",
                base_sequence
            )));
        }
        let exponent = lyapunov_exponent(base_period, &perturbed_periods).ok_or_else(|| {
            OrbitError::AllPerturbationsFailed {
                sequence: base_sequence.to_string(),
                attempted: 0,
            }
        })?;
        let ratios = perturbed_periods
            .iter()
            .map(|&p| period_ratio(base_period, p))
            .collect();

        Ok(Self {
            sequence_rendered: base_sequence.to_string(),
            base_sequence,
            base_period,
            perturbed_periods,
            ratios,
            exponent,
            classification: thresholds.classify(exponent),
        })
    }

    pub fn perturbations_tested(&self) -> usize {
        self.perturbed_periods.len()
    }

    pub fn sequence_length(&self) -> usize {
        self.base_sequence.len()
    }

    /// `|perturbed_period - base_period|` per sample
    pub fn divergences(&self) -> Vec<u64> {
        self.perturbed_periods
            .iter()
            .map(|&p| p.abs_diff(self.base_period))
            .collect()
    }

    pub fn statistics(&self) -> RecordStatistics {
        let divergences: Vec<f64> = self.divergences().into_iter().map(|d| d as f64).collect();
        RecordStatistics {
            mean_ratio: stats::mean(&self.ratios).unwrap_or(1.0),
            std_ratio: stats::population_std(&self.ratios).unwrap_or(0.0),
            max_ratio: stats::max(&self.ratios).unwrap_or(1.0),
            mean_divergence: stats::mean(&divergences).unwrap_or(0.0),
            max_divergence: stats::max(&divergences).unwrap_or(0.0),
        }
    }

    /// Same sequence measured to the same periods. Exponent and ratios follow
    /// from these, so float noise from a JSON round trip does not matter.
    pub fn same_measurement(&self, other: &Self) -> bool {
        self.base_sequence == other.base_sequence
            && self.base_period == other.base_period
            && self.perturbed_periods == other.perturbed_periods
    }

    /// Recompute classification from the stored exponent. Returns true when it
    /// changed. Periods, ratios and the exponent are left untouched.
    pub fn reclassify(&mut self, thresholds: &Thresholds) -> bool {
        let updated = thresholds.classify(self.exponent);
        let changed = updated != self.classification;
        self.classification = updated;
        changed
    }

    /// Check the write-once fields agree with each other; used when loading
    /// artifacts from disk.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        if self.base_period == 0 {
            return Err("base_period is 0".to_string());
        }
        if self.perturbed_periods.is_empty() {
            return Err("no perturbed periods".to_string());
        }
        if self.perturbed_periods.len() != self.ratios.len() {
            return Err(format!(
                "{} perturbed periods but {} ratios",
                self.perturbed_periods.len(),
                self.ratios.len()
            ));
        }
        for (&p, &r) in self.perturbed_periods.iter().zip(&self.ratios) {
            if p == 0 {
                return Err("perturbed period is 0".to_string());
            }
            if (period_ratio(self.base_period, p) - r).abs() > RATIO_TOLERANCE * r.max(1.0) {
                return Err(format!("ratio {} does not match periods", r));
            }
        }
        if !self.exponent.is_finite() || self.exponent < 0.0 {
            return Err(format!("exponent {} is not a finite non-negative number", self.exponent));
        }
        Ok(())
    }
}
