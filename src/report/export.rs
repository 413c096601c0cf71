// src/report/export.rs
// Tabular and JSON exports for external plotting tools

use super::summary::{ranked, BatchSummary};
use crate::error::Result;
use crate::exponent::SequenceExponentRecord;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// Column order of the per-record export
pub const CSV_COLUMNS: [&str; 11] = [
    "sequence",
    "sequence_length",
    "base_period",
    "lyapunov_exponent",
    "classification",
    "perturbations_tested",
    "mean_ratio",
    "std_ratio",
    "max_ratio",
    "mean_divergence",
    "max_divergence",
];

/// One row per record, most chaotic first
pub fn records_csv(records: &[SequenceExponentRecord]) -> String {
    let mut out = String::new();
    push_row(&mut out, CSV_COLUMNS.iter().map(|c| c.to_string()));

    for record in ranked(records) {
        let s = record.statistics();
        push_row(
            &mut out,
            [
                record.sequence_rendered.clone(),
                record.sequence_length().to_string(),
                record.base_period.to_string(),
                record.exponent.to_string(),
                record.classification.to_string(),
                record.perturbations_tested().to_string(),
                s.mean_ratio.to_string(),
                s.std_ratio.to_string(),
                s.max_ratio.to_string(),
                s.mean_divergence.to_string(),
                s.max_divergence.to_string(),
            ],
        );
    }
    out
}

pub async fn write_csv(path: &Path, records: &[SequenceExponentRecord]) -> Result<()> {
    tokio::fs::write(path, records_csv(records)).await?;
    info!(path = %path.display(), rows = records.len(), "Wrote CSV export");
    Ok(())
}

pub async fn write_summary(path: &Path, summary: &BatchSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    tokio::fs::write(path, json).await?;
    info!(path = %path.display(), "Wrote summary");
    Ok(())
}

pub(crate) fn push_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    let line = fields
        .into_iter()
        .map(|f| csv_field(&f))
        .collect::<Vec<_>>()
        .join(",");
    let _ = writeln!(out, "{}", line);
}

/// Quote a field when it holds a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exponent::Thresholds;
    use crate::report::summary::summarize;
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
    fn test_csv_header_and_rows() {
        let csv = records_csv(&[record(&["FR"], 8, vec![8, 8, 4]), record(&["UF", "OR"], 6, vec![6])]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_COLUMNS.join(","));
        // Most chaotic first
        assert!(lines[1].starts_with("FR,1,8,"));
        assert!(lines[1].contains(",weakly_chaotic,3,"));
        assert!(lines[1].ends_with(",2,1.3333333333333333,4"));
        assert!(lines[2].starts_with("UF → OR,2,6,0,trivial,1,1,0,1,0,0"));
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![record(&["FR"], 8, vec![4])];

        let csv_path = dir.path().join("lyapunov.csv");
        write_csv(&csv_path, &records).await.unwrap();
        assert_eq!(std::fs::read_to_string(&csv_path).unwrap().lines().count(), 2);

        let summary_path = dir.path().join("lyapunov_summary.json");
        write_summary(&summary_path, &summarize(&records)).await.unwrap();
        let parsed: BatchSummary =
            serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
        assert_eq!(parsed.total_sequences, 1);
    }
}
