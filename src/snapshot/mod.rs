//! Snapshot lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! new_snapshot()                      → STAGING
//!     record_error() / seal()         (while staging)
//! promote(id)      [mutex, O(1)]      → id ACTIVE, previous RETIRING
//! acquire_active() [mutex, O(1)]      → SnapshotHandle (refcount + 1)
//! drop(handle)     [mutex, O(1)]      → refcount - 1
//!     RETIRING && refcount == 0       → RETIRED, records freed outside the lock
//! ```
//!
//! # Design Decisions
//! - The registry alone owns snapshot and record lifetime; callers hold handles
//! - Handles are RAII guards, release happens on drop
//! - Identifiers are random v4 UUIDs; ordering comes from a separate generation
//! - The active id is mirrored into an `ArcSwapOption` for lock-free observers

pub mod handle;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

pub use handle::SnapshotHandle;
pub use registry::{GcReport, Promotion, SnapshotRegistry};

/// Collision-resistant snapshot identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    /// Allocate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Lifecycle state of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotState {
    Staging,
    Active,
    Retiring,
    Retired,
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotState::Staging => "STAGING",
            SnapshotState::Active => "ACTIVE",
            SnapshotState::Retiring => "RETIRING",
            SnapshotState::Retired => "RETIRED",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a snapshot's bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    pub generation: u64,
    pub state: SnapshotState,
    pub refcount: usize,
    pub created_at: SystemTime,
    pub sealed: bool,
    pub errors: Vec<String>,
}

/// Registry operation failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("unknown snapshot {0}")]
    Unknown(SnapshotId),

    #[error("snapshot {id} is {state}, expected STAGING")]
    NotStaging { id: SnapshotId, state: SnapshotState },

    #[error("snapshot {0} has not completed staging")]
    StagingIncomplete(SnapshotId),

    #[error("snapshot {id} has {count} staging error(s), first: {first}")]
    Unpromotable {
        id: SnapshotId,
        count: usize,
        first: String,
    },

    #[error("snapshot {id} is older than active snapshot {active}")]
    Superseded { id: SnapshotId, active: SnapshotId },

    #[error("snapshot {0} is active and cannot be discarded")]
    ActiveSnapshot(SnapshotId),
}
