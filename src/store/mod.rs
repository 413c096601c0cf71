// src/store/mod.rs
// Persistence of per-sequence exponent records

pub mod json_dir;
pub mod memory;

use crate::error::Result;
use crate::exponent::{SequenceExponentRecord, Thresholds};
use crate::sequence::MoveSequence;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;

/// Outcome of a reclassification pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifyReport {
    /// Records visited
    pub total: usize,
    /// Records whose classification changed
    pub updated: usize,
}

/// Where finished records live.
///
/// A record is keyed by its exact ordered token list. Saving the same
/// measurement twice is a no-op; saving a different one for a stored key fails
/// with `RecordConflict`. Only `reclassify_all` may change a stored record, and
/// only its classification.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a fully computed record. `run_index` keeps concurrent writers
    /// on distinct artifact names.
    async fn save(&self, record: &SequenceExponentRecord, run_index: usize) -> Result<()>;

    /// Every readable record; unreadable artifacts are skipped with a warning
    async fn load_all(&self) -> Result<Vec<SequenceExponentRecord>>;

    /// Sequences that already have a record
    async fn keys(&self) -> Result<HashSet<MoveSequence>>;

    async fn contains(&self, sequence: &MoveSequence) -> Result<bool> {
        Ok(self.keys().await?.contains(sequence))
    }

    /// Re-derive every stored classification from its stored exponent
    async fn reclassify_all(&self, thresholds: &Thresholds) -> Result<ReclassifyReport>;
}
