//! Metrics collection and exposition.
//!
//! # Metrics
//! - `config_sync_cycles_total` (counter): refresh cycles by outcome
//! - `config_sync_cycle_duration_seconds` (histogram): cycle latency
//! - `config_sync_fetch_total` (counter): pulls by outcome
//! - `config_sync_fragment_errors_total` (counter): staging errors by kind
//! - `config_sync_records` (gauge): records in the active snapshot per model
//! - `config_sync_snapshots` (gauge): tracked snapshots per lifecycle state
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; a no-op until an exporter is installed
//! - Prometheus exporter is optional and bound to its own listener

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::snapshot::{SnapshotInfo, SnapshotState};
use crate::store::ModelType;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_cycle(outcome: &'static str, start: Instant) {
    counter!("config_sync_cycles_total", "outcome" => outcome).increment(1);
    histogram!("config_sync_cycle_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_fetch(outcome: &'static str) {
    counter!("config_sync_fetch_total", "outcome" => outcome).increment(1);
}

pub fn record_fragment_error(kind: &'static str) {
    counter!("config_sync_fragment_errors_total", "kind" => kind).increment(1);
}

pub fn record_active_records(model: ModelType, count: usize) {
    gauge!("config_sync_records", "model" => model.name()).set(count as f64);
}

pub fn record_snapshot_states(snapshots: &[SnapshotInfo]) {
    for state in [
        SnapshotState::Staging,
        SnapshotState::Active,
        SnapshotState::Retiring,
        SnapshotState::Retired,
    ] {
        let count = snapshots.iter().filter(|s| s.state == state).count();
        gauge!("config_sync_snapshots", "state" => state.to_string()).set(count as f64);
    }
}
