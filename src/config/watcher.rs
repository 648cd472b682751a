//! Local authoring directory watcher.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Watches a fragment directory and nudges the refresh scheduler.
pub struct BundleWatcher {
    path: PathBuf,
    nudge_tx: mpsc::Sender<()>,
}

impl BundleWatcher {
    /// Create a watcher that sends on `nudge_tx` when `path` changes.
    pub fn new(path: &Path, nudge_tx: mpsc::Sender<()>) -> Self {
        Self {
            path: path.to_path_buf(),
            nudge_tx,
        }
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as nudges are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.nudge_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        tracing::debug!(paths = ?event.paths, "Fragment change detected");
                        // a full channel already holds a pending nudge
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Fragment watcher started");
        Ok(watcher)
    }
}
