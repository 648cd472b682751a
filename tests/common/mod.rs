//! Shared fixtures for integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use gateway_config_sync::bundle::{BundleFetcher, FallbackPointer, ManagementPlane};
use gateway_config_sync::config::DeploymentMode;
use gateway_config_sync::refresh::{RefreshScheduler, SchedulerSettings};
use gateway_config_sync::{ModelStore, SnapshotRegistry};

pub fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

/// One record per model type, all tagged with `revision`.
pub fn managed_bundle(revision: &str) -> Vec<(String, String)> {
    let files = [
        (
            "catalogs-1.json",
            json!([{ "id": "cat-1", "name": "sandbox", "revision": revision }]),
        ),
        (
            "products-1.json",
            json!([{ "id": "prod-1", "name": "weather-plan", "revision": revision }]),
        ),
        (
            "apis-1.json",
            json!([
                { "id": "api-1", "name": "weather", "revision": revision },
                { "id": "api-2", "name": "stock", "revision": revision }
            ]),
        ),
        (
            "subs-1.json",
            json!([{ "id": "sub-1", "app": "mobile", "revision": revision }]),
        ),
    ];
    files
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

pub fn write_files(dir: &Path, files: &[(String, String)]) {
    std::fs::create_dir_all(dir).unwrap();
    for (name, content) in files {
        write(dir, name, content);
    }
}

/// Local authoring directory: one product referencing two APIs, the second
/// by a name that only resolves with the `.yaml` suffix appended.
pub fn write_local_product(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    write(
        dir,
        "weather-product.yaml",
        "product: 1.0.0\n\
         info:\n  name: weather-product\n  version: 1.0.0\n\
         apis:\n  - $ref: weather-api.yaml\n  - $ref: stock-api\n",
    );
    write(
        dir,
        "weather-api.yaml",
        "swagger: '2.0'\n\
         info:\n  x-ibm-name: weather-api\n  version: 1.0.0\n\
         basePath: /weather\n",
    );
    write(
        dir,
        "stock-api.yaml",
        "swagger: '2.0'\n\
         info:\n  x-ibm-name: stock-api\n  version: 2.0.0\n\
         basePath: /stock\n",
    );
}

pub fn load_yaml(path: &Path) -> Value {
    let text = std::fs::read_to_string(path).unwrap();
    serde_yaml::from_str(&text).unwrap()
}

/// Poll until `done` holds, panicking after five seconds.
pub async fn eventually(mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn registry() -> SnapshotRegistry {
    SnapshotRegistry::new(Arc::new(ModelStore::new()))
}

pub fn bundle_dirs(work_dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(work_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(_) => Vec::new(),
    }
}

struct PlaneState {
    files: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
    delay_ms: AtomicUsize,
    held: AtomicBool,
    gate: Semaphore,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for PlaneState {
    fn default() -> Self {
        Self {
            files: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            delay_ms: AtomicUsize::new(0),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

/// Management plane serving a scripted bundle, instrumented for overlap.
#[derive(Clone, Default)]
pub struct FixturePlane {
    state: Arc<PlaneState>,
}

impl FixturePlane {
    pub fn serving(files: Vec<(String, String)>) -> Self {
        let plane = Self::default();
        plane.set_files(files);
        plane
    }

    pub fn set_files(&self, files: Vec<(String, String)>) {
        *self.state.files.lock().unwrap() = files;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Block every pull until [`FixturePlane::release`].
    pub fn hold(&self) {
        self.state.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.state.held.store(false, Ordering::SeqCst);
        self.state.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ManagementPlane for FixturePlane {
    async fn pull(&self, _host: &str, out_dir: &Path) -> Result<usize, String> {
        let state = &self.state;
        state.calls.fetch_add(1, Ordering::SeqCst);
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if state.held.load(Ordering::SeqCst) {
            let _permit = state.gate.acquire().await;
        }

        let delay = state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        let result = if state.failing.load(Ordering::SeqCst) {
            Err("management plane unreachable".to_string())
        } else {
            let files = state.files.lock().unwrap().clone();
            files
                .iter()
                .try_for_each(|(name, content)| std::fs::write(out_dir.join(name), content))
                .map(|()| files.len())
                .map_err(|e| e.to_string())
        };

        state.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub struct Harness {
    pub root: tempfile::TempDir,
    pub plane: FixturePlane,
    pub registry: SnapshotRegistry,
}

impl Harness {
    pub fn new(plane: FixturePlane) -> Self {
        Self {
            root: tempfile::TempDir::new().unwrap(),
            plane,
            registry: registry(),
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn pointer(&self) -> FallbackPointer {
        FallbackPointer::new(self.root.path().join(".current"))
    }

    pub fn settings(&self, mode: DeploymentMode, fallback_dir: Option<PathBuf>) -> SchedulerSettings {
        SchedulerSettings {
            mode,
            endpoint: match mode {
                DeploymentMode::Managed => Some("apim.test".to_string()),
                DeploymentMode::LocalAuthoring => None,
            },
            work_dir: self.work_dir(),
            fallback_dir,
            pointer: self.pointer(),
            period: Duration::from_millis(20),
        }
    }

    pub fn scheduler(&self, settings: SchedulerSettings) -> RefreshScheduler<FixturePlane> {
        RefreshScheduler::new(
            settings,
            BundleFetcher::new(self.plane.clone(), Duration::from_secs(5)),
            self.registry.clone(),
        )
    }
}
