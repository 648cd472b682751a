//! Serialized fetch → resolve → stage → promote cycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::bundle::{
    remove_bundle, BundleFetcher, FallbackPointer, FetchError, ManagementPlane, BUNDLE_DIR_PREFIX,
};
use crate::config::{DeploymentMode, SyncConfig};
use crate::error::SyncError;
use crate::observability::metrics;
use crate::resolver::FragmentResolver;
use crate::snapshot::{Promotion, SnapshotId, SnapshotRegistry};
use crate::store::ModelType;

/// Where the directory of a cycle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleSource {
    /// Freshly pulled from the management plane.
    Fresh,
    /// Last-known-good (or authoring) directory.
    Fallback,
}

/// Sent once, after the first successful promotion.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyEvent {
    pub snapshot: SnapshotId,
    pub source: BundleSource,
    pub dir: PathBuf,
}

/// Result of one refresh cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    Promoted {
        snapshot: SnapshotId,
        superseded: Option<SnapshotId>,
        source: BundleSource,
        dir: PathBuf,
        records: usize,
    },
    Failed {
        snapshot: Option<SnapshotId>,
        source: Option<BundleSource>,
        error: SyncError,
    },
}

impl CycleOutcome {
    pub fn is_promoted(&self) -> bool {
        matches!(self, CycleOutcome::Promoted { .. })
    }

    pub fn snapshot(&self) -> Option<SnapshotId> {
        match self {
            CycleOutcome::Promoted { snapshot, .. } => Some(*snapshot),
            CycleOutcome::Failed { snapshot, .. } => *snapshot,
        }
    }
}

/// Static inputs of the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub mode: DeploymentMode,
    pub endpoint: Option<String>,
    pub work_dir: PathBuf,
    pub fallback_dir: Option<PathBuf>,
    pub pointer: FallbackPointer,
    pub period: Duration,
}

impl SchedulerSettings {
    /// Derive scheduler inputs from validated settings.
    ///
    /// In managed mode the persisted pointer, when it names an existing
    /// directory, takes precedence over `config_dir`.
    pub fn from_config(config: &SyncConfig) -> Self {
        let mode = config.deployment_mode();
        let pointer = FallbackPointer::new(&config.sync.pointer_file);
        let fallback_dir = initial_fallback(mode, &pointer, &config.sync.config_dir);
        Self {
            mode,
            endpoint: config.sync.management_host.clone(),
            work_dir: config.sync.work_dir.clone(),
            fallback_dir: Some(fallback_dir),
            pointer,
            period: config.sync.refresh_interval(),
        }
    }
}

fn initial_fallback(mode: DeploymentMode, pointer: &FallbackPointer, config_dir: &Path) -> PathBuf {
    if mode == DeploymentMode::Managed {
        match pointer.load() {
            Ok(Some(dir)) if dir.is_dir() => {
                tracing::info!(dir = %dir.display(), "Using persisted fallback directory");
                return dir;
            }
            Ok(Some(dir)) => {
                tracing::warn!(dir = %dir.display(), "Persisted fallback directory is missing");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(pointer = %pointer.path().display(), error = %e, "Cannot read fallback pointer");
            }
        }
    }
    config_dir.to_path_buf()
}

/// Drives refresh cycles, one at a time.
pub struct RefreshScheduler<P> {
    settings: SchedulerSettings,
    fetcher: BundleFetcher<P>,
    resolver: Arc<FragmentResolver>,
    registry: SnapshotRegistry,
    readiness: Option<oneshot::Sender<ReadyEvent>>,
    nudges: Option<mpsc::Receiver<()>>,
}

impl<P: ManagementPlane> RefreshScheduler<P> {
    pub fn new(
        settings: SchedulerSettings,
        fetcher: BundleFetcher<P>,
        registry: SnapshotRegistry,
    ) -> Self {
        let resolver = Arc::new(FragmentResolver::new(settings.mode));
        Self {
            settings,
            fetcher,
            resolver,
            registry,
            readiness: None,
            nudges: None,
        }
    }

    /// Receive a [`ReadyEvent`] after the first successful promotion.
    pub fn with_readiness(mut self, tx: oneshot::Sender<ReadyEvent>) -> Self {
        self.readiness = Some(tx);
        self
    }

    /// Allow early cycles to be requested between scheduled ones.
    pub fn with_nudges(mut self, rx: mpsc::Receiver<()>) -> Self {
        self.nudges = Some(rx);
        self
    }

    pub fn registry(&self) -> &SnapshotRegistry {
        &self.registry
    }

    /// Directory used when no fresh bundle is available.
    pub fn fallback_dir(&self) -> Option<&Path> {
        self.settings.fallback_dir.as_deref()
    }

    /// Run cycles until shutdown.
    ///
    /// The next cycle is armed only after the current one finishes.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            mode = %self.settings.mode,
            period = ?self.settings.period,
            "Refresh scheduler starting"
        );

        loop {
            self.run_cycle().await;

            let pause = tokio::time::sleep(self.settings.period);
            tokio::select! {
                _ = pause => {}
                Some(()) = next_nudge(&mut self.nudges) => {
                    tracing::debug!("Early refresh requested");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Refresh scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Execute one full cycle. Never panics on cycle failure.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let start = Instant::now();

        let gc = self.registry.collect_garbage();
        if !gc.discarded_staging.is_empty() || gc.pruned_retired > 0 {
            tracing::debug!(
                discarded_staging = gc.discarded_staging.len(),
                pruned_retired = gc.pruned_retired,
                "Garbage collection pass"
            );
        }

        let (dir, source) = match self.acquire_bundle().await {
            Ok(found) => found,
            Err(error) => {
                return self.finish(
                    start,
                    CycleOutcome::Failed {
                        snapshot: None,
                        source: None,
                        error,
                    },
                )
            }
        };

        let snapshot = self.registry.new_snapshot();
        tracing::info!(snapshot = %snapshot, dir = %dir.display(), source = ?source, "Refresh cycle started");

        let outcome = match self.stage_and_promote(snapshot, &dir).await {
            Ok((promotion, records)) => {
                self.after_promotion(&promotion, source, &dir).await;
                CycleOutcome::Promoted {
                    snapshot,
                    superseded: promotion.superseded,
                    source,
                    dir,
                    records,
                }
            }
            Err(error) => {
                if let Err(e) = self.registry.discard(snapshot) {
                    tracing::warn!(snapshot = %snapshot, error = %e, "Failed to discard staged snapshot");
                }
                if source == BundleSource::Fresh {
                    remove_bundle(&dir).await;
                }
                CycleOutcome::Failed {
                    snapshot: Some(snapshot),
                    source: Some(source),
                    error,
                }
            }
        };
        self.finish(start, outcome)
    }

    async fn acquire_bundle(&self) -> Result<(PathBuf, BundleSource), SyncError> {
        let fetched = self
            .fetcher
            .fetch(
                self.settings.mode,
                self.settings.endpoint.as_deref(),
                &self.settings.work_dir,
            )
            .await;

        let error = match fetched {
            Ok(dir) => {
                metrics::record_fetch("ok");
                return Ok((dir, BundleSource::Fresh));
            }
            Err(e) => e,
        };

        metrics::record_fetch(error.outcome());
        if !matches!(error, FetchError::NoEndpoint) {
            tracing::warn!(error = %error, "Fetch failed, falling back to last-known-good directory");
        }
        match &self.settings.fallback_dir {
            Some(dir) => Ok((dir.clone(), BundleSource::Fallback)),
            None => Err(SyncError::NoConfiguration(format!(
                "{} and no fallback directory is configured",
                error
            ))),
        }
    }

    async fn stage_and_promote(
        &self,
        snapshot: SnapshotId,
        dir: &Path,
    ) -> Result<(Promotion, usize), SyncError> {
        let resolver = self.resolver.clone();
        let bundle = dir.to_path_buf();
        let mut resolution = tokio::task::spawn_blocking(move || resolver.resolve(&bundle))
            .await
            .map_err(|e| SyncError::Parse {
                path: dir.to_path_buf(),
                reason: format!("resolver task failed: {}", e),
            })??;

        for error in &resolution.errors {
            metrics::record_fragment_error(error.kind());
            self.registry.record_error(snapshot, error)?;
        }

        let mut staged = 0;
        if resolution.is_clean() {
            let store = self.registry.store();
            for model in ModelType::ALL {
                store.stage(model);
                let records = resolution.take(model);
                match store.bulk_insert(model, snapshot, records) {
                    Ok(count) => staged += count,
                    Err(e) => {
                        tracing::warn!(snapshot = %snapshot, model = %model, error = %e, "Bulk insert failed");
                        metrics::record_fragment_error("storage");
                        self.registry.record_error(snapshot, SyncError::Storage(e))?;
                        break;
                    }
                }
            }
        }

        self.registry.seal(snapshot)?;
        let promotion = self.registry.promote(snapshot)?;
        Ok((promotion, staged))
    }

    async fn after_promotion(&mut self, promotion: &Promotion, source: BundleSource, dir: &Path) {
        if source == BundleSource::Fresh {
            let previous = self.settings.fallback_dir.replace(dir.to_path_buf());
            match self.settings.pointer.store(dir) {
                Ok(()) => {
                    tracing::info!(dir = %dir.display(), "Fallback pointer updated");
                    if let Some(previous) = previous {
                        if previous != dir && self.is_fetched_bundle(&previous) {
                            tracing::debug!(dir = %previous.display(), "Removing superseded bundle");
                            remove_bundle(&previous).await;
                        }
                    }
                }
                // the pointer still names `previous`, so it stays on disk
                Err(e) => tracing::error!(
                    pointer = %self.settings.pointer.path().display(),
                    error = %e,
                    "Failed to persist fallback pointer"
                ),
            }
        }

        if let Some(tx) = self.readiness.take() {
            let event = ReadyEvent {
                snapshot: promotion.promoted,
                source,
                dir: dir.to_path_buf(),
            };
            if tx.send(event).is_err() {
                tracing::debug!("Readiness receiver dropped");
            }
        }

        let store = self.registry.store();
        for model in ModelType::ALL {
            metrics::record_active_records(model, store.count(model, promotion.promoted));
        }
    }

    /// Whether `dir` is a bundle directory this scheduler's fetcher created.
    fn is_fetched_bundle(&self, dir: &Path) -> bool {
        dir.parent() == Some(self.settings.work_dir.as_path())
            && dir
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(BUNDLE_DIR_PREFIX))
    }

    fn finish(&self, start: Instant, outcome: CycleOutcome) -> CycleOutcome {
        match &outcome {
            CycleOutcome::Promoted {
                snapshot,
                superseded,
                records,
                ..
            } => {
                tracing::info!(
                    snapshot = %snapshot,
                    superseded = ?superseded,
                    records,
                    elapsed = ?start.elapsed(),
                    "Snapshot promoted"
                );
                metrics::record_cycle("promoted", start);
            }
            CycleOutcome::Failed { snapshot, error, .. } => {
                tracing::error!(
                    snapshot = ?snapshot,
                    kind = error.kind(),
                    error = %error,
                    active = ?self.registry.active_id(),
                    "Refresh cycle failed, keeping active snapshot"
                );
                metrics::record_cycle("failed", start);
            }
        }
        metrics::record_snapshot_states(&self.registry.snapshots());
        outcome
    }
}

async fn next_nudge(nudges: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match nudges {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
