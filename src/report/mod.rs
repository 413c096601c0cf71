// src/report/mod.rs
// Aggregation, exports and human-readable reports

pub mod analysis;
pub mod export;
pub mod stats;
pub mod summary;

pub use analysis::{analyze, ExtendedAnalysis};
pub use export::{records_csv, write_csv, write_summary};
pub use summary::{summarize, BatchSummary};

use crate::exponent::Classification;
use std::fmt::Write as _;

const RULE_WIDTH: usize = 70;

/// Plain-text rendering of a summary for the terminal
pub fn render_summary(summary: &BatchSummary) -> String {
    let mut out = String::new();
    let rule = "=".repeat(RULE_WIDTH);

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "LYAPUNOV EXPONENT SUMMARY");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Sequences analysed: {}", summary.total_sequences);

    let Some(overall) = summary.overall else {
        let _ = writeln!(out, "No records.");
        return out;
    };

    let _ = writeln!(out);
    let _ = writeln!(out, "Exponent λ");
    let _ = writeln!(out, "  mean   {:.4}", overall.mean);
    let _ = writeln!(out, "  median {:.4}", overall.median);
    let _ = writeln!(out, "  std    {:.4}", overall.std);
    let _ = writeln!(out, "  range  {:.4} .. {:.4}", overall.min, overall.max);

    let _ = writeln!(out);
    let _ = writeln!(out, "Classification");
    for class in Classification::ALL {
        let count = summary.count(class);
        let pct = 100.0 * count as f64 / summary.total_sequences as f64;
        let _ = writeln!(out, "  {:<18} {:>6} ({:5.1}%)", class.as_str(), count, pct);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "By length");
    for (length, bucket) in &summary.by_length {
        let _ = writeln!(
            out,
            "  {:>2} moves: n={:<5} mean={:.3} median={:.3} max={:.3}  most chaotic: {} (λ={:.3})",
            length,
            bucket.count,
            bucket.mean_exponent,
            bucket.median_exponent,
            bucket.max_exponent,
            bucket.most_chaotic.sequence,
            bucket.most_chaotic.exponent
        );
    }

    out
}

/// Plain-text rendering of the extended analysis
pub fn render_analysis(analysis: &ExtendedAnalysis) -> String {
    let mut out = String::new();
    let rule = "-".repeat(RULE_WIDTH);
    let dist = &analysis.ratio_distribution;

    let _ = writeln!(out, "PERTURBATION SENSITIVITY");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Perturbations (non-trivial records): {}", dist.total_perturbations);
    if let (Some(min), Some(max), Some(median), Some(mean)) =
        (dist.min_ratio, dist.max_ratio, dist.median_ratio, dist.mean_ratio)
    {
        let _ = writeln!(out, "Ratio range {:.1} .. {:.1}, median {:.1}, mean {:.1}", min, max, median, mean);
    }
    let _ = writeln!(out, "Ratios > 100x: {}   > 1000x: {}", dist.ratios_over_100, dist.ratios_over_1000);
    for bin in &dist.histogram {
        let _ = writeln!(out, "  {:>10} {}", bin.label(), bin.count);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "MOVE PATTERNS");
    let _ = writeln!(out, "{}", rule);
    for (class, pairs) in &analysis.move_patterns.top_pairs {
        if pairs.is_empty() {
            continue;
        }
        let listed: Vec<String> = pairs.iter().map(|(p, n)| format!("{} ({})", p, n)).collect();
        let _ = writeln!(out, "  {:<18} {}", class.as_str(), listed.join(", "));
    }

    if !analysis.move_patterns.self_compositions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "SELF-COMPOSITIONS");
        let _ = writeln!(out, "{}", rule);
        for entry in &analysis.move_patterns.self_compositions {
            let _ = writeln!(
                out,
                "  {}∘{}  λ={:.3}  {}",
                entry.token, entry.token, entry.exponent, entry.classification
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exponent::{SequenceExponentRecord, Thresholds};
    use crate::sequence::MoveSequence;

    fn record(names: &[&str], base: u64, periods: Vec<u64>) -> SequenceExponentRecord {
        SequenceExponentRecord::from_periods(
            MoveSequence::from_names(names).unwrap(),
            base,
            periods,
            &Thresholds::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_render_empty_summary() {
        let text = render_summary(&summarize(&[]));
        assert!(text.contains("Sequences analysed: 0"));
        assert!(text.contains("No records."));
    }

    #[test]
    fn test_render_summary_lists_classes_and_lengths() {
        let records = vec![record(&["FR"], 8, vec![8, 8, 4]), record(&["FR", "UF"], 6, vec![6])];
        let text = render_summary(&summarize(&records));
        for class in Classification::ALL {
            assert!(text.contains(class.as_str()));
        }
        assert!(text.contains("most chaotic: FR (λ=0.231)"));
        assert!(text.contains("most chaotic: FR → UF"));
    }

    #[test]
    fn test_render_analysis() {
        let records = vec![record(&["FR", "FR"], 4, vec![16]), record(&["FR", "UF"], 4, vec![8])];
        let text = render_analysis(&analyze(&records));
        assert!(text.contains("FR∘FR"));
        assert!(text.contains("FR→UF (1)"));
        assert!(text.contains(">5000"));
    }
}
