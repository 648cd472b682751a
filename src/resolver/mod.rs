//! Fragment resolution subsystem.
//!
//! # Data Flow
//! ```text
//! bundle directory
//!     → list files (sorted by name)
//!     → FragmentStrategy (chosen once from DeploymentMode)
//!         managed: prefix → model type, each JSON array element is a record
//!         local:   shape  → model type, $ref entries inlined one hop deep
//!     → Resolution { records by model type, per-file errors }
//! ```
//!
//! # Design Decisions
//! - A failing file drops only its own records; siblings keep resolving
//! - Any error makes the whole resolution unpromotable
//! - Reference resolution never recurses into inlined documents
//! - Pure file I/O, no locks held; callers run it on a blocking thread

pub mod classify;
pub mod reference;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::DeploymentMode;
use crate::error::SyncError;
use crate::store::{ModelType, PendingRecord};
pub use classify::{FragmentStrategy, LocalAuthoringStrategy, ManagedStrategy};

/// Records produced from one bundle directory.
#[derive(Debug)]
pub struct Resolution {
    pub mode: DeploymentMode,
    pub records: BTreeMap<ModelType, Vec<PendingRecord>>,
    pub errors: Vec<SyncError>,
    pub files_ignored: usize,
}

impl Resolution {
    pub fn new(mode: DeploymentMode) -> Self {
        Self {
            mode,
            records: BTreeMap::new(),
            errors: Vec::new(),
            files_ignored: 0,
        }
    }

    pub(crate) fn push_records(&mut self, model: ModelType, records: Vec<PendingRecord>) {
        self.records.entry(model).or_default().extend(records);
    }

    /// True when every fragment resolved.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Take the records of one model type, leaving an empty list.
    pub fn take(&mut self, model: ModelType) -> Vec<PendingRecord> {
        self.records.remove(&model).unwrap_or_default()
    }
}

/// Turns a bundle directory into typed records.
pub struct FragmentResolver {
    strategy: Box<dyn FragmentStrategy>,
}

impl FragmentResolver {
    /// Build a resolver for a deployment mode.
    pub fn new(mode: DeploymentMode) -> Self {
        let strategy: Box<dyn FragmentStrategy> = match mode {
            DeploymentMode::Managed => Box::new(ManagedStrategy),
            DeploymentMode::LocalAuthoring => Box::new(LocalAuthoringStrategy),
        };
        Self { strategy }
    }

    /// Build a resolver around a custom strategy.
    pub fn with_strategy(strategy: Box<dyn FragmentStrategy>) -> Self {
        Self { strategy }
    }

    pub fn mode(&self) -> DeploymentMode {
        self.strategy.mode()
    }

    /// Resolve every fragment in `dir`.
    ///
    /// Fails outright only when the directory cannot be listed; per-file
    /// failures are collected in [`Resolution::errors`].
    pub fn resolve(&self, dir: &Path) -> Result<Resolution, SyncError> {
        let files = list_files(dir)?;
        tracing::debug!(dir = %dir.display(), files = files.len(), mode = %self.mode(), "Resolving fragments");
        Ok(self.strategy.resolve(dir, &files))
    }
}

/// Resolve `dir` with the strategy for `mode`.
pub fn resolve(dir: &Path, mode: DeploymentMode) -> Result<Resolution, SyncError> {
    FragmentResolver::new(mode).resolve(dir)
}

fn list_files(dir: &Path) -> Result<Vec<String>, SyncError> {
    let entries = fs::read_dir(dir).map_err(|e| SyncError::Parse {
        path: dir.to_path_buf(),
        reason: format!("cannot list bundle directory: {}", e),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SyncError::Parse {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            files.push(name.to_string());
        }
    }
    files.sort();
    Ok(files)
}
