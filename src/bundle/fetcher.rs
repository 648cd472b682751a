//! Bundle fetcher: fresh pull into a unique work directory.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::bundle::puller::ManagementPlane;
use crate::config::DeploymentMode;

/// Name prefix of every directory the fetcher creates under the work dir.
pub const BUNDLE_DIR_PREFIX: &str = "bundle-";

/// Why a fresh bundle is not available this cycle. Never fatal.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no management endpoint configured")]
    NoEndpoint,

    #[error("cannot create bundle directory {path}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pull from {host} failed: {reason}")]
    Pull { host: String, reason: String },

    #[error("pull from {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },
}

impl FetchError {
    /// Label for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            FetchError::NoEndpoint => "skipped",
            FetchError::WorkDir { .. } => "workdir_error",
            FetchError::Pull { .. } => "pull_error",
            FetchError::Timeout { .. } => "timeout",
        }
    }
}

/// Obtains fresh bundles from the management plane.
pub struct BundleFetcher<P> {
    plane: P,
    timeout: Duration,
}

impl<P: ManagementPlane> BundleFetcher<P> {
    pub fn new(plane: P, timeout: Duration) -> Self {
        Self { plane, timeout }
    }

    /// Pull a bundle into a fresh subdirectory of `work_dir`.
    ///
    /// Returns immediately without I/O when there is no endpoint or the mode
    /// is local authoring. On failure the subdirectory is removed.
    pub async fn fetch(
        &self,
        mode: DeploymentMode,
        endpoint: Option<&str>,
        work_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        let host = match (mode, endpoint) {
            (DeploymentMode::Managed, Some(host)) if !host.is_empty() => host,
            _ => return Err(FetchError::NoEndpoint),
        };

        let bundle_dir = work_dir.join(format!("{}{}", BUNDLE_DIR_PREFIX, uuid::Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(work_dir)
            .await
            .map_err(|source| FetchError::WorkDir {
                path: work_dir.to_path_buf(),
                source,
            })?;
        tokio::fs::create_dir(&bundle_dir)
            .await
            .map_err(|source| FetchError::WorkDir {
                path: bundle_dir.clone(),
                source,
            })?;

        let result = tokio::time::timeout(self.timeout, self.plane.pull(host, &bundle_dir)).await;
        let error = match result {
            Ok(Ok(files)) => {
                tracing::info!(host, dir = %bundle_dir.display(), files, "Bundle fetched");
                return Ok(bundle_dir);
            }
            Ok(Err(reason)) => FetchError::Pull {
                host: host.to_string(),
                reason,
            },
            Err(_) => FetchError::Timeout {
                host: host.to_string(),
                timeout: self.timeout,
            },
        };

        remove_bundle(&bundle_dir).await;
        Err(error)
    }
}

/// Delete a bundle directory, logging instead of failing.
///
/// A failed removal is retried once after a short pause.
pub async fn remove_bundle(dir: &Path) {
    for attempt in 1..=REMOVE_ATTEMPTS {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => return,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) if attempt < REMOVE_ATTEMPTS => {
                tracing::debug!(dir = %dir.display(), error = %e, "Retrying bundle directory removal");
                tokio::time::sleep(REMOVE_RETRY_DELAY).await;
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove bundle directory");
            }
        }
    }
}

const REMOVE_ATTEMPTS: u32 = 2;
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(50);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct ScriptedPlane {
        calls: Arc<AtomicUsize>,
        fail: bool,
        hang: bool,
    }

    impl ManagementPlane for ScriptedPlane {
        async fn pull(&self, _host: &str, out_dir: &Path) -> Result<usize, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(out_dir.join("apis-1.json"), b"[]")
                .await
                .map_err(|e| e.to_string())?;
            if self.hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail {
                return Err("connection refused".to_string());
            }
            Ok(1)
        }
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_no_endpoint_skips_pull() {
        let tmp = TempDir::new().unwrap();
        let plane = ScriptedPlane::default();
        let fetcher = BundleFetcher::new(plane.clone(), Duration::from_secs(1));

        let err = fetcher
            .fetch(DeploymentMode::Managed, None, tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoEndpoint));

        let err = fetcher
            .fetch(DeploymentMode::LocalAuthoring, Some("apim"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoEndpoint));
        assert_eq!(plane.calls.load(Ordering::SeqCst), 0);
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_success_returns_unique_dirs() {
        let tmp = TempDir::new().unwrap();
        let fetcher = BundleFetcher::new(ScriptedPlane::default(), Duration::from_secs(1));

        let a = fetcher.fetch(DeploymentMode::Managed, Some("apim"), tmp.path()).await.unwrap();
        let b = fetcher.fetch(DeploymentMode::Managed, Some("apim"), tmp.path()).await.unwrap();
        assert_ne!(a, b);
        assert!(a.join("apis-1.json").exists());
        assert!(a.starts_with(tmp.path()));
    }

    #[tokio::test]
    async fn test_failure_removes_partial_dir() {
        let tmp = TempDir::new().unwrap();
        let plane = ScriptedPlane {
            fail: true,
            ..Default::default()
        };
        let fetcher = BundleFetcher::new(plane, Duration::from_secs(1));

        let err = fetcher
            .fetch(DeploymentMode::Managed, Some("apim"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Pull { .. }));
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_remove_bundle_clears_nested_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("bundle-x");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("apis-1.json"), b"[]").unwrap();
        std::fs::write(dir.join("nested").join("a.yaml"), b"name: a").unwrap();

        remove_bundle(&dir).await;
        assert!(!dir.exists());

        // already gone
        remove_bundle(&dir).await;
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_partial_dir() {
        let tmp = TempDir::new().unwrap();
        let plane = ScriptedPlane {
            hang: true,
            ..Default::default()
        };
        let fetcher = BundleFetcher::new(plane, Duration::from_millis(50));

        let err = fetcher
            .fetch(DeploymentMode::Managed, Some("apim"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
        assert_eq!(err.outcome(), "timeout");
        assert_eq!(entries(tmp.path()), 0);
    }
}
