// src/report/analysis.rs
// Extended analysis: ratio spectrum, move patterns, divergence vs exponent

use super::export::push_row;
use super::stats;
use crate::exponent::{Classification, SequenceExponentRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Upper edges of the ratio histogram; one overflow bin follows the last
pub const HISTOGRAM_EDGES: [f64; 12] = [
    1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0,
];

/// Pairs listed per class in the move-pattern report
const TOP_PAIRS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ExtendedAnalysis {
    pub ratio_distribution: RatioDistribution,
    pub move_patterns: MovePatterns,
    pub divergence: Vec<DivergencePoint>,
}

/// Spread of period ratios across all perturbations of non-trivial records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioDistribution {
    pub total_perturbations: usize,
    pub min_ratio: Option<f64>,
    pub max_ratio: Option<f64>,
    pub median_ratio: Option<f64>,
    pub mean_ratio: Option<f64>,
    pub ratios_over_100: usize,
    pub ratios_over_1000: usize,
    pub histogram: Vec<HistogramBin>,
}

/// Ratios in `(lower, upper]`; the first bin has no lower edge and the
/// overflow bin no upper edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub count: usize,
}

impl HistogramBin {
    pub fn label(&self) -> String {
        match (self.lower, self.upper) {
            (None, Some(upper)) => format!("≤{}", upper),
            (Some(lower), Some(upper)) => format!("{}-{}", lower, upper),
            (Some(lower), None) => format!(">{}", lower),
            (None, None) => "all".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MovePatterns {
    /// Token occurrences per class, most frequent first
    pub move_counts: BTreeMap<Classification, Vec<(String, usize)>>,
    /// The most frequent adjacent pairs (`A→B`) per class
    pub top_pairs: BTreeMap<Classification, Vec<(String, usize)>>,
    /// Records of the form `[X, X]`
    pub self_compositions: Vec<SelfComposition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfComposition {
    pub token: String,
    pub exponent: f64,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivergencePoint {
    pub sequence: String,
    pub exponent: f64,
    pub max_divergence: f64,
    pub mean_divergence: f64,
    pub classification: Classification,
}

pub fn analyze(records: &[SequenceExponentRecord]) -> ExtendedAnalysis {
    ExtendedAnalysis {
        ratio_distribution: ratio_distribution(records),
        move_patterns: move_patterns(records),
        divergence: divergence_points(records),
    }
}

pub fn ratio_distribution(records: &[SequenceExponentRecord]) -> RatioDistribution {
    // Trivial records only ever contribute ratio 1
    let ratios: Vec<f64> = records
        .iter()
        .filter(|r| r.classification != Classification::Trivial)
        .flat_map(|r| r.ratios.iter().copied())
        .collect();

    let mut histogram = Vec::with_capacity(HISTOGRAM_EDGES.len() + 1);
    let mut lower: Option<f64> = None;
    for &upper in &HISTOGRAM_EDGES {
        let count = ratios
            .iter()
            .filter(|&&r| r <= upper && lower.is_none_or(|l| r > l))
            .count();
        histogram.push(HistogramBin {
            lower,
            upper: Some(upper),
            count,
        });
        lower = Some(upper);
    }
    histogram.push(HistogramBin {
        lower,
        upper: None,
        count: ratios.iter().filter(|&&r| lower.is_none_or(|l| r > l)).count(),
    });

    RatioDistribution {
        total_perturbations: ratios.len(),
        min_ratio: stats::min(&ratios),
        max_ratio: stats::max(&ratios),
        median_ratio: stats::median(&ratios),
        mean_ratio: stats::mean(&ratios),
        ratios_over_100: ratios.iter().filter(|&&r| r > 100.0).count(),
        ratios_over_1000: ratios.iter().filter(|&&r| r > 1000.0).count(),
        histogram,
    }
}

pub fn move_patterns(records: &[SequenceExponentRecord]) -> MovePatterns {
    let mut token_counts: HashMap<Classification, HashMap<String, usize>> = HashMap::new();
    let mut pair_counts: HashMap<Classification, HashMap<String, usize>> = HashMap::new();
    let mut self_compositions = Vec::new();

    for record in records {
        let names = record.base_sequence.names();

        let tokens = token_counts.entry(record.classification).or_default();
        for name in &names {
            *tokens.entry(name.clone()).or_default() += 1;
        }

        let pairs = pair_counts.entry(record.classification).or_default();
        for window in names.windows(2) {
            *pairs.entry(format!("{}→{}", window[0], window[1])).or_default() += 1;
        }

        if let [a, b] = names.as_slice()
            && a == b
        {
            self_compositions.push(SelfComposition {
                token: a.clone(),
                exponent: record.exponent,
                classification: record.classification,
            });
        }
    }

    self_compositions.sort_by(|a, b| {
        b.exponent
            .total_cmp(&a.exponent)
            .then_with(|| a.token.cmp(&b.token))
    });

    let mut patterns = MovePatterns {
        self_compositions,
        ..MovePatterns::default()
    };
    for class in Classification::ALL {
        let tokens = token_counts.remove(&class).unwrap_or_default();
        patterns.move_counts.insert(class, most_common(tokens, None));
        let pairs = pair_counts.remove(&class).unwrap_or_default();
        patterns.top_pairs.insert(class, most_common(pairs, Some(TOP_PAIRS)));
    }
    patterns
}

pub fn divergence_points(records: &[SequenceExponentRecord]) -> Vec<DivergencePoint> {
    records
        .iter()
        .map(|r| {
            let s = r.statistics();
            DivergencePoint {
                sequence: r.sequence_rendered.clone(),
                exponent: r.exponent,
                max_divergence: s.max_divergence,
                mean_divergence: s.mean_divergence,
                classification: r.classification,
            }
        })
        .collect()
}

/// CSV of divergence points for plotting
pub fn divergence_csv(points: &[DivergencePoint]) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        ["sequence", "lambda", "max_divergence", "mean_divergence", "classification"]
            .iter()
            .map(|c| c.to_string()),
    );
    for p in points {
        push_row(
            &mut out,
            [
                p.sequence.clone(),
                p.exponent.to_string(),
                p.max_divergence.to_string(),
                p.mean_divergence.to_string(),
                p.classification.to_string(),
            ],
        );
    }
    out
}

/// Highest count first, ties alphabetical
fn most_common(counts: HashMap<String, usize>, limit: Option<usize>) -> Vec<(String, usize)> {
    let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if let Some(limit) = limit {
        sorted.truncate(limit);
    }
    sorted
}
