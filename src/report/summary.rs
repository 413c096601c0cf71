// src/report/summary.rs
// Batch summary: pure aggregation over records

use super::stats;
use crate::exponent::{Classification, SequenceExponentRecord};
use crate::sequence::MoveSequence;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Aggregate view of a set of records; carries no state of its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_sequences: usize,
    /// `None` when there are no records
    pub overall: Option<ExponentStats>,
    /// Every class is present, zero counts included
    pub classification_counts: BTreeMap<Classification, usize>,
    pub by_length: BTreeMap<usize, LengthBucket>,
}

/// Exponent statistics over all records (population std)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthBucket {
    pub count: usize,
    pub mean_exponent: f64,
    pub median_exponent: f64,
    pub max_exponent: f64,
    pub most_chaotic: MostChaotic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostChaotic {
    pub sequence: MoveSequence,
    pub exponent: f64,
}

impl BatchSummary {
    pub fn count(&self, class: Classification) -> usize {
        self.classification_counts.get(&class).copied().unwrap_or(0)
    }
}

/// Summarize records. Input order does not affect the result.
pub fn summarize(records: &[SequenceExponentRecord]) -> BatchSummary {
    let mut classification_counts: BTreeMap<Classification, usize> =
        Classification::ALL.iter().map(|c| (*c, 0)).collect();
    for record in records {
        *classification_counts.entry(record.classification).or_default() += 1;
    }

    let exponents: Vec<f64> = records.iter().map(|r| r.exponent).collect();
    let overall = exponent_stats(&exponents);

    let mut grouped: BTreeMap<usize, Vec<&SequenceExponentRecord>> = BTreeMap::new();
    for record in records {
        grouped.entry(record.sequence_length()).or_default().push(record);
    }

    let by_length = grouped
        .into_iter()
        .filter_map(|(length, group)| bucket(&group).map(|b| (length, b)))
        .collect();

    BatchSummary {
        total_sequences: records.len(),
        overall,
        classification_counts,
        by_length,
    }
}

fn exponent_stats(exponents: &[f64]) -> Option<ExponentStats> {
    Some(ExponentStats {
        mean: stats::mean(exponents)?,
        median: stats::median(exponents)?,
        std: stats::population_std(exponents)?,
        min: stats::min(exponents)?,
        max: stats::max(exponents)?,
    })
}

fn bucket(group: &[&SequenceExponentRecord]) -> Option<LengthBucket> {
    let exponents: Vec<f64> = group.iter().map(|r| r.exponent).collect();
    // Highest exponent; ties go to the smallest sequence so the pick is stable
    let top = group.iter().max_by(|a, b| {
        a.exponent
            .total_cmp(&b.exponent)
            .then_with(|| b.base_sequence.cmp(&a.base_sequence))
    })?;

    Some(LengthBucket {
        count: group.len(),
        mean_exponent: stats::mean(&exponents)?,
        median_exponent: stats::median(&exponents)?,
        max_exponent: stats::max(&exponents)?,
        most_chaotic: MostChaotic {
            sequence: top.base_sequence.clone(),
            exponent: top.exponent,
        },
    })
}

/// Records sorted most chaotic first (ties by sequence)
pub fn ranked(records: &[SequenceExponentRecord]) -> Vec<&SequenceExponentRecord> {
    let mut sorted: Vec<&SequenceExponentRecord> = records.iter().collect();
    sorted.sort_by(|a, b| match b.exponent.total_cmp(&a.exponent) {
        Ordering::Equal => a.base_sequence.cmp(&b.base_sequence),
        other => other,
    });
    sorted
}
