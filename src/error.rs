//! Error taxonomy for the synchronization core.
//!
//! Only [`SyncError::NoConfiguration`] is fatal. Everything else fails the
//! current refresh cycle and leaves the active snapshot serving.

use std::path::PathBuf;

use thiserror::Error;

use crate::bundle::FetchError;
use crate::snapshot::RegistryError;
use crate::store::StorageError;

/// Failure surfaced by one stage of a refresh cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Management plane unreachable or the bundle could not be written.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A fragment file is malformed.
    #[error("parse error in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// A cross-referenced file could not be loaded, even with the fallback suffix.
    #[error("unresolved reference `{reference}` in {path}: {reason}")]
    ReferenceResolution {
        path: PathBuf,
        reference: String,
        reason: String,
    },

    /// Bulk insert into the model store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The staged snapshot was not promoted; the previous one keeps serving.
    #[error("promotion skipped: {0}")]
    PromotionSkipped(#[from] RegistryError),

    /// Nothing was ever promoted and there is no directory to fall back to.
    #[error("no configuration to serve: {0}")]
    NoConfiguration(String),
}

impl SyncError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Fetch(_) => "fetch",
            SyncError::Parse { .. } => "parse",
            SyncError::ReferenceResolution { .. } => "reference",
            SyncError::Storage(_) => "storage",
            SyncError::PromotionSkipped(_) => "promotion_skipped",
            SyncError::NoConfiguration(_) => "no_configuration",
        }
    }

    /// Whether the process can keep running after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::NoConfiguration(_))
    }
}
