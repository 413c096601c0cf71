// src/store/json_dir.rs
// Directory of JSON artifacts, one file per base sequence

use super::{RecordStore, ReclassifyReport};
use crate::error::{OrbitError, Result};
use crate::exponent::{RecordStatistics, SequenceExponentRecord, Thresholds};
use crate::sequence::MoveSequence;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix shared by every record artifact
const RECORD_PREFIX: &str = "lyapunov_";

/// Aggregate report written next to the records; never a record itself
pub const SUMMARY_FILE: &str = "lyapunov_summary.json";

/// On-disk shape: the record plus derived statistics for external tools.
/// Statistics are rewritten on every save and ignored when reading.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedRecord {
    #[serde(flatten)]
    record: SequenceExponentRecord,
    #[serde(default, skip_deserializing)]
    statistics: Option<RecordStatistics>,
}

impl PersistedRecord {
    fn to_json(record: &SequenceExponentRecord) -> Result<String> {
        let persisted = PersistedRecord {
            record: record.clone(),
            statistics: Some(record.statistics()),
        };
        Ok(serde_json::to_string_pretty(&persisted)?)
    }
}

/// What the index remembers about a stored record
#[derive(Debug, Clone)]
struct IndexEntry {
    path: PathBuf,
    base_period: u64,
    perturbed_periods: Vec<u64>,
}

impl IndexEntry {
    fn new(path: PathBuf, record: &SequenceExponentRecord) -> Self {
        Self {
            path,
            base_period: record.base_period,
            perturbed_periods: record.perturbed_periods.clone(),
        }
    }

    fn matches(&self, record: &SequenceExponentRecord) -> bool {
        self.base_period == record.base_period && self.perturbed_periods == record.perturbed_periods
    }
}

/// Records as `lyapunov_{run_index:04}_{stem}.json` files in one directory.
///
/// The key index is built once at open and kept in memory; all saves go
/// through it, so two handles on the same directory should not write
/// concurrently.
pub struct JsonDirStore {
    dir: PathBuf,
    index: Mutex<HashMap<MoveSequence, IndexEntry>>,
}

impl JsonDirStore {
    /// Open (creating if needed) a records directory and index what it holds
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut index = HashMap::new();
        for (path, record) in read_records(&dir).await? {
            match index.entry(record.base_sequence.clone()) {
                Entry::Occupied(existing) => {
                    let existing: &IndexEntry = existing.get();
                    warn!(
                        sequence = %record.base_sequence,
                        kept = %existing.path.display(),
                        ignored = %path.display(),
                        "Duplicate record on disk"
                    );
                }
                Entry::Vacant(slot) => {
                    slot.insert(IndexEntry::new(path, &record));
                }
            }
        }

        info!(dir = %dir.display(), records = index.len(), "Opened record store");
        Ok(Self {
            dir,
            index: Mutex::new(index),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE)
    }

    /// Artifact name for a new record; falls back to a unique suffix if a
    /// differently keyed file already holds the natural name
    fn artifact_path(&self, sequence: &MoveSequence, run_index: usize) -> PathBuf {
        let stem = sequence.file_stem();
        let natural = self
            .dir
            .join(format!("{}{:04}_{}.json", RECORD_PREFIX, run_index, stem));
        if !natural.exists() {
            return natural;
        }
        let suffix = Uuid::new_v4().simple().to_string();
        self.dir.join(format!(
            "{}{:04}_{}_{}.json",
            RECORD_PREFIX,
            run_index,
            stem,
            &suffix[..8]
        ))
    }
}

#[async_trait]
impl RecordStore for JsonDirStore {
    async fn save(&self, record: &SequenceExponentRecord, run_index: usize) -> Result<()> {
        // Held for the whole save so a key is never written twice
        let mut index = self.index.lock().await;

        if let Some(entry) = index.get(&record.base_sequence) {
            if entry.matches(record) {
                debug!(sequence = %record.base_sequence, "Record already stored");
                return Ok(());
            }
            return Err(OrbitError::RecordConflict(format!(
                "{} ({})",
                record.base_sequence,
                entry.path.display()
            )));
        }

        let path = self.artifact_path(&record.base_sequence, run_index);
        write_atomic(&path, PersistedRecord::to_json(record)?.as_bytes()).await?;
        debug!(sequence = %record.base_sequence, path = %path.display(), "Saved record");

        index.insert(record.base_sequence.clone(), IndexEntry::new(path, record));
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<SequenceExponentRecord>> {
        Ok(read_records(&self.dir)
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    async fn keys(&self) -> Result<HashSet<MoveSequence>> {
        Ok(self.index.lock().await.keys().cloned().collect())
    }

    async fn contains(&self, sequence: &MoveSequence) -> Result<bool> {
        Ok(self.index.lock().await.contains_key(sequence))
    }

    async fn reclassify_all(&self, thresholds: &Thresholds) -> Result<ReclassifyReport> {
        let _index = self.index.lock().await;
        let mut report = ReclassifyReport::default();

        for (path, mut record) in read_records(&self.dir).await? {
            report.total += 1;
            let before = record.classification;
            if record.reclassify(thresholds) {
                write_atomic(&path, PersistedRecord::to_json(&record)?.as_bytes()).await?;
                report.updated += 1;
                info!(
                    sequence = %record.base_sequence,
                    exponent = record.exponent,
                    from = %before,
                    to = %record.classification,
                    "Reclassified"
                );
            }
        }

        Ok(report)
    }
}

/// File names that may hold a record
fn is_record_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(RECORD_PREFIX) && name.ends_with(".json") && name != SUMMARY_FILE
}

/// Parse one artifact, checking its write-once fields agree
fn parse_record(path: &Path, contents: &str) -> Result<SequenceExponentRecord> {
    let persisted: PersistedRecord =
        serde_json::from_str(contents).map_err(|e| OrbitError::MalformedRecord {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    persisted
        .record
        .check_consistency()
        .map_err(|reason| OrbitError::MalformedRecord {
            path: path.to_path_buf(),
            reason,
        })?;
    Ok(persisted.record)
}

/// Every readable record in `dir`, in file-name order. Unreadable or
/// malformed artifacts are logged and skipped.
async fn read_records(dir: &Path) -> Result<Vec<(PathBuf, SequenceExponentRecord)>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_record_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read record");
                continue;
            }
        };
        match parse_record(&path, &contents) {
            Ok(record) => records.push((path, record)),
            Err(e) => warn!(error = %e, "Skipping record"),
        }
    }
    Ok(records)
}

/// Write via a temp file in the same directory and rename into place, so a
/// record name never points at a partial file
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp_path = {
        let mut tmp = path.to_path_buf();
        tmp.set_extension(format!("json.tmp.{}", Uuid::new_v4().simple()));
        tmp
    };

    let mut file = tokio::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exponent::Classification;
    use tempfile::TempDir;

    fn record(names: &[&str], base: u64, periods: Vec<u64>) -> SequenceExponentRecord {
        SequenceExponentRecord::from_periods(
            MoveSequence::from_names(names).unwrap(),
            base,
            periods,
            &Thresholds::default(),
        )
        .unwrap()
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // ============================================================================
    // Save / load
    // ============================================================================

    #[tokio::test]
    async fn test_save_writes_named_artifact() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(dir.path()).await.unwrap();
        store.save(&record(&["FR", "UF"], 10_080, vec![2_160, 6]), 7).await.unwrap();

        assert_eq!(file_names(dir.path()), vec!["lyapunov_0007_FR_UF.json"]);

        let raw = std::fs::read_to_string(dir.path().join("lyapunov_0007_FR_UF.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["base_sequence"], serde_json::json!(["FR", "UF"]));
        assert_eq!(json["sequence_rendered"], "FR → UF");
        assert_eq!(json["classification"], "extremely_chaotic");
        assert_eq!(json["statistics"]["max_divergence"], 10_074.0);
    }

    #[tokio::test]
    async fn test_reopen_sees_previous_records() {
        let dir = TempDir::new().unwrap();
        let r = record(&["FR"], 8, vec![8, 8, 4]);
        {
            let store = JsonDirStore::open(dir.path()).await.unwrap();
            store.save(&r, 0).await.unwrap();
        }
        let store = JsonDirStore::open(dir.path()).await.unwrap();
        assert!(store.contains(&r.base_sequence).await.unwrap());

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].same_measurement(&r));
        assert_eq!(loaded[0].classification, r.classification);
    }

    #[tokio::test]
    async fn test_duplicate_save_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(dir.path()).await.unwrap();
        let r = record(&["FR"], 8, vec![4]);
        store.save(&r, 0).await.unwrap();
        store.save(&r, 5).await.unwrap();
        assert_eq!(file_names(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_different_record_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(dir.path()).await.unwrap();
        store.save(&record(&["FR"], 8, vec![4]), 0).await.unwrap();

        let err = store.save(&record(&["FR"], 8, vec![16]), 1).await.unwrap_err();
        assert!(matches!(err, OrbitError::RecordConflict(_)));
        assert_eq!(file_names(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_taken_name_gets_unique_suffix() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(dir.path()).await.unwrap();
        // "R'" and "R-" share a file stem
        store.save(&record(&["R'"], 4, vec![2]), 0).await.unwrap();
        store.save(&record(&["R-"], 4, vec![2]), 0).await.unwrap();

        let names = file_names(dir.path());
        assert_eq!(names.len(), 2);
        assert_eq!(store.load_all().await.unwrap().len(), 2);
    }

    // ============================================================================
    // Tolerant loading
    // ============================================================================

    #[tokio::test]
    async fn test_load_skips_junk() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(dir.path()).await.unwrap();
        store.save(&record(&["FR"], 8, vec![4]), 0).await.unwrap();

        std::fs::write(dir.path().join("lyapunov_0001_UF.json"), "{not json").unwrap();
        std::fs::write(dir.path().join(SUMMARY_FILE), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("lyapunov_0002_OR.json.tmp.abc"), "{").unwrap();
        // Parses but the ratio disagrees with the periods
        std::fs::write(
            dir.path().join("lyapunov_0003_RO.json"),
            r#"{"base_sequence":["RO"],"sequence_rendered":"RO","base_period":8,
               "perturbed_periods":[4],"ratios":[3.0],"exponent":1.0,
               "classification":"weakly_chaotic"}"#,
        )
        .unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].base_sequence.names(), vec!["FR"]);
    }

    #[tokio::test]
    async fn test_load_skips_records_with_bad_tokens() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("lyapunov_0000_FR-UF.json"),
            r#"{"base_sequence":["FR,UF"],"sequence_rendered":"FR,UF","base_period":8,
               "perturbed_periods":[4],"ratios":[2.0],"exponent":0.6931471805599453,
               "classification":"weakly_chaotic"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("lyapunov_0001_.json"),
            r#"{"base_sequence":[""],"sequence_rendered":"","base_period":8,
               "perturbed_periods":[4],"ratios":[2.0],"exponent":0.6931471805599453,
               "classification":"weakly_chaotic"}"#,
        )
        .unwrap();

        let store = JsonDirStore::open(dir.path()).await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statistics_block_is_ignored_on_read() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("lyapunov_0000_FR.json"),
            r#"{"base_sequence":["FR"],"sequence_rendered":"FR","base_period":8,
               "perturbed_periods":[4],"ratios":[2.0],"exponent":0.6931471805599453,
               "classification":"weakly_chaotic",
               "statistics":{"mean_ratio":99.0}}"#,
        )
        .unwrap();
        let store = JsonDirStore::open(dir.path()).await.unwrap();
        assert_eq!(store.keys().await.unwrap().len(), 1);
    }

    // ============================================================================
    // Reclassification
    // ============================================================================

    #[tokio::test]
    async fn test_reclassify_rewrites_only_changed_files() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(dir.path()).await.unwrap();

        let mut stale = record(&["FR", "UF"], 8, vec![4]);
        stale.exponent = 3.5;
        stale.classification = Classification::WeaklyChaotic;
        store.save(&stale, 0).await.unwrap();
        store.save(&record(&["OR"], 6, vec![6]), 1).await.unwrap();

        let report = store.reclassify_all(&Thresholds::default()).await.unwrap();
        assert_eq!(report, ReclassifyReport { total: 2, updated: 1 });

        let loaded = store.load_all().await.unwrap();
        let updated = loaded
            .iter()
            .find(|r| r.base_sequence == stale.base_sequence)
            .unwrap();
        assert_eq!(updated.classification, Classification::StronglyChaotic);
        assert_eq!(updated.base_period, 8);
        assert_eq!(updated.perturbed_periods, vec![4]);
        assert_eq!(updated.ratios, vec![2.0]);

        // Second pass has nothing left to change
        let again = store.reclassify_all(&Thresholds::default()).await.unwrap();
        assert_eq!(again.updated, 0);
        assert_eq!(file_names(dir.path()).len(), 2);
    }

    #[test]
    fn test_record_file_filter() {
        assert!(is_record_file(Path::new("/r/lyapunov_0001_FR.json")));
        assert!(!is_record_file(Path::new("/r/lyapunov_summary.json")));
        assert!(!is_record_file(Path::new("/r/lyapunov_0001_FR.json.tmp.1")));
        assert!(!is_record_file(Path::new("/r/period_FR.json")));
    }
}
