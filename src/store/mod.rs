//! Typed, append-only record store.
//!
//! # Data Flow
//! ```text
//! stage(model_type)                     (idempotent, every cycle)
//!     → bulk_insert(model_type, snapshot, records)
//!         → build partition off to the side
//!         → publish partition in one map insert
//!     → get / records  (readers, via SnapshotHandle)
//!     → discard(snapshot)  (retirement or failed staging)
//! ```
//!
//! # Design Decisions
//! - One partition per (model type, snapshot id); a partition is either
//!   fully visible or absent, never partially filled
//! - Partitions are immutable once published; a second insert for the same
//!   pair is rejected
//! - Records are shared as `Arc<ModelRecord>` so readers never copy documents

pub mod model;

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

use crate::snapshot::SnapshotId;
pub use model::{document_key, ModelRecord, ModelType, PendingRecord};

/// Failure to attach records to a snapshot.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("model type `{0}` has not been staged")]
    NotStaged(ModelType),

    #[error("duplicate {model_type} key `{key}` in snapshot {snapshot}")]
    DuplicateKey {
        model_type: ModelType,
        snapshot: SnapshotId,
        key: String,
    },

    #[error("{model_type} records already committed for snapshot {snapshot}")]
    AlreadyCommitted {
        model_type: ModelType,
        snapshot: SnapshotId,
    },

    #[error("{model_type} record `{key}` rejected: {reason}")]
    Rejected {
        model_type: ModelType,
        key: String,
        reason: String,
    },
}

/// Records of one model type attached to one snapshot.
#[derive(Debug, Default)]
struct Partition {
    records: Vec<Arc<ModelRecord>>,
    by_key: HashMap<String, usize>,
}

impl Partition {
    fn get(&self, key: &str) -> Option<Arc<ModelRecord>> {
        self.by_key.get(key).map(|&i| self.records[i].clone())
    }
}

/// Storage structure for one model type.
#[derive(Debug)]
struct ModelTable {
    staged_at: SystemTime,
    partitions: DashMap<SnapshotId, Arc<Partition>>,
}

/// Record store keyed by (model type, snapshot id).
#[derive(Debug, Default)]
pub struct ModelStore {
    tables: DashMap<ModelType, ModelTable>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure the storage structure for `model_type` exists.
    pub fn stage(&self, model_type: ModelType) {
        self.tables.entry(model_type).or_insert_with(|| {
            tracing::debug!(model = %model_type, "Model table created");
            ModelTable {
                staged_at: SystemTime::now(),
                partitions: DashMap::new(),
            }
        });
    }

    /// When the table for `model_type` was first staged.
    pub fn staged_at(&self, model_type: ModelType) -> Option<SystemTime> {
        self.tables.get(&model_type).map(|t| t.staged_at)
    }

    /// Attach every record to `snapshot` in one logical operation.
    ///
    /// Either all records become visible under `snapshot` or none do.
    pub fn bulk_insert(
        &self,
        model_type: ModelType,
        snapshot: SnapshotId,
        records: Vec<PendingRecord>,
    ) -> Result<usize, StorageError> {
        let table = self
            .tables
            .get(&model_type)
            .ok_or(StorageError::NotStaged(model_type))?;

        let mut partition = Partition::default();
        for pending in records {
            if !pending.document.is_object() {
                return Err(StorageError::Rejected {
                    model_type,
                    key: pending.key,
                    reason: "document is not an object".to_string(),
                });
            }
            if partition.by_key.contains_key(&pending.key) {
                return Err(StorageError::DuplicateKey {
                    model_type,
                    snapshot,
                    key: pending.key,
                });
            }
            partition
                .by_key
                .insert(pending.key.clone(), partition.records.len());
            partition.records.push(Arc::new(ModelRecord {
                model_type,
                snapshot_id: snapshot,
                key: pending.key,
                document: pending.document,
            }));
        }

        let count = partition.records.len();
        let committed = match table.partitions.entry(snapshot) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StorageError::AlreadyCommitted { model_type, snapshot })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(partition));
                Ok(count)
            }
        };
        committed
    }

    /// Look up one record by key.
    pub fn get(
        &self,
        model_type: ModelType,
        snapshot: SnapshotId,
        key: &str,
    ) -> Option<Arc<ModelRecord>> {
        let table = self.tables.get(&model_type)?;
        let partition = table.partitions.get(&snapshot)?;
        partition.get(key)
    }

    /// All records of a model type in a snapshot, in insertion order.
    pub fn records(&self, model_type: ModelType, snapshot: SnapshotId) -> Vec<Arc<ModelRecord>> {
        self.tables
            .get(&model_type)
            .and_then(|t| t.partitions.get(&snapshot).map(|p| p.records.clone()))
            .unwrap_or_default()
    }

    /// Number of records a snapshot holds for `model_type`.
    pub fn count(&self, model_type: ModelType, snapshot: SnapshotId) -> usize {
        self.tables
            .get(&model_type)
            .and_then(|t| t.partitions.get(&snapshot).map(|p| p.records.len()))
            .unwrap_or(0)
    }

    /// Whether any records are held for `snapshot`.
    pub fn contains_snapshot(&self, snapshot: SnapshotId) -> bool {
        self.tables
            .iter()
            .any(|t| t.partitions.contains_key(&snapshot))
    }

    /// Drop every record attached to `snapshot`. Returns the number freed.
    pub fn discard(&self, snapshot: SnapshotId) -> usize {
        let mut freed = 0;
        for table in self.tables.iter() {
            if let Some((_, partition)) = table.partitions.remove(&snapshot) {
                freed += partition.records.len();
            }
        }
        freed
    }
}
