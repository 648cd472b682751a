//! Read-only admin API over the snapshot read interface.
//!
//! # Data Flow
//! ```text
//! GET /admin/...
//!     → auth.rs (bearer key)
//!     → handlers.rs
//!         → SnapshotRegistry::acquire_active (handle pinned for the request)
//!         → SnapshotHandle::lookup / records
//! ```

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{AdminConfig, DeploymentMode};
use crate::snapshot::SnapshotRegistry;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state of the admin router.
#[derive(Clone)]
pub struct AdminState {
    pub registry: SnapshotRegistry,
    pub config: Arc<AdminConfig>,
    pub mode: DeploymentMode,
    pub started: Instant,
}

impl AdminState {
    pub fn new(registry: SnapshotRegistry, config: AdminConfig, mode: DeploymentMode) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            mode,
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/snapshots", get(get_snapshots))
        .route("/admin/records/{model}", get(get_records))
        .route("/admin/records/{model}/{key}", get(get_record))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
