// src/store/memory.rs
// In-memory record store for tests and dry runs

use super::{RecordStore, ReclassifyReport};
use crate::error::{OrbitError, Result};
use crate::exponent::{SequenceExponentRecord, Thresholds};
use crate::sequence::MoveSequence;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<MoveSequence, SequenceExponentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, bypassing conflict checks
    pub fn with_records(records: impl IntoIterator<Item = SequenceExponentRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.base_sequence.clone(), r))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, sequence: &MoveSequence) -> Option<SequenceExponentRecord> {
        self.records.read().await.get(sequence).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn save(&self, record: &SequenceExponentRecord, _run_index: usize) -> Result<()> {
        let mut records = self.records.write().await;
        match records.get(&record.base_sequence) {
            Some(existing) if existing.same_measurement(record) => Ok(()),
            Some(_) => Err(OrbitError::RecordConflict(record.base_sequence.to_string())),
            None => {
                records.insert(record.base_sequence.clone(), record.clone());
                Ok(())
            }
        }
    }

    async fn load_all(&self) -> Result<Vec<SequenceExponentRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn keys(&self) -> Result<HashSet<MoveSequence>> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn contains(&self, sequence: &MoveSequence) -> Result<bool> {
        Ok(self.records.read().await.contains_key(sequence))
    }

    async fn reclassify_all(&self, thresholds: &Thresholds) -> Result<ReclassifyReport> {
        let mut records = self.records.write().await;
        let mut report = ReclassifyReport::default();
        for record in records.values_mut() {
            report.total += 1;
            if record.reclassify(thresholds) {
                report.updated += 1;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exponent::Classification;

    fn record(names: &[&str], base: u64, periods: Vec<u64>) -> SequenceExponentRecord {
        SequenceExponentRecord::from_periods(
            MoveSequence::from_names(names).unwrap(),
            base,
            periods,
            &Thresholds::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_contains() {
        let store = MemoryStore::new();
        let r = record(&["FR"], 8, vec![8, 8, 4]);
        store.save(&r, 0).await.unwrap();

        assert!(store.contains(&r.base_sequence).await.unwrap());
        assert_eq!(store.len().await, 1);
        assert_eq!(store.load_all().await.unwrap(), vec![r]);
    }

    #[tokio::test]
    async fn test_identical_save_is_noop_and_different_conflicts() {
        let store = MemoryStore::new();
        store.save(&record(&["FR"], 8, vec![4]), 0).await.unwrap();
        store.save(&record(&["FR"], 8, vec![4]), 3).await.unwrap();

        let err = store.save(&record(&["FR"], 8, vec![2]), 4).await.unwrap_err();
        assert!(matches!(err, OrbitError::RecordConflict(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_reclassify_updates_stale_record() {
        let mut stale = record(&["FR", "UF"], 8, vec![4]);
        stale.exponent = 3.5;
        stale.classification = Classification::WeaklyChaotic;
        let store = MemoryStore::with_records([stale.clone(), record(&["UF"], 6, vec![6])]);

        let report = store.reclassify_all(&Thresholds::default()).await.unwrap();
        assert_eq!(report, ReclassifyReport { total: 2, updated: 1 });

        let updated = store.get(&stale.base_sequence).await.unwrap();
        assert_eq!(updated.classification, Classification::StronglyChaotic);
        assert_eq!(updated.ratios, stale.ratios);
        assert_eq!(updated.perturbed_periods, stale.perturbed_periods);
    }
}
