//! Refcounted read handles.

use std::fmt;
use std::sync::Arc;

use crate::snapshot::registry::RegistryInner;
use crate::snapshot::SnapshotId;
use crate::store::{ModelRecord, ModelType};

/// A RAII guard pinning one snapshot for reading.
///
/// Records stay readable until the last handle on a superseded snapshot
/// is dropped.
pub struct SnapshotHandle {
    inner: Arc<RegistryInner>,
    id: SnapshotId,
}

impl SnapshotHandle {
    pub(crate) fn new(inner: Arc<RegistryInner>, id: SnapshotId) -> Self {
        Self { inner, id }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// Look up a record in the pinned snapshot.
    pub fn lookup(&self, model_type: ModelType, key: &str) -> Option<Arc<ModelRecord>> {
        self.inner.store.get(model_type, self.id, key)
    }

    /// All records of a model type in the pinned snapshot.
    pub fn records(&self, model_type: ModelType) -> Vec<Arc<ModelRecord>> {
        self.inner.store.records(model_type, self.id)
    }
}

impl Clone for SnapshotHandle {
    fn clone(&self) -> Self {
        self.inner.retain(self.id);
        Self {
            inner: self.inner.clone(),
            id: self.id,
        }
    }
}

impl Drop for SnapshotHandle {
    fn drop(&mut self) {
        self.inner.release(self.id);
    }
}

impl fmt::Debug for SnapshotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotHandle").field("id", &self.id).finish()
    }
}
