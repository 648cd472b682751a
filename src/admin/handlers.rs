use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::admin::AdminState;
use crate::snapshot::{SnapshotId, SnapshotInfo};
use crate::store::{ModelRecord, ModelType};

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub mode: String,
    pub ready: bool,
    pub active_snapshot: Option<SnapshotId>,
    pub records: BTreeMap<&'static str, usize>,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let handle = state.registry.acquire_active();
    let mut records = BTreeMap::new();
    if let Some(handle) = &handle {
        for model in ModelType::ALL {
            records.insert(model.name(), handle.records(model).len());
        }
    }

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        mode: state.mode.to_string(),
        ready: handle.is_some(),
        active_snapshot: handle.as_ref().map(|h| h.id()),
        records,
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

pub async fn get_snapshots(State(state): State<AdminState>) -> Json<Vec<SnapshotInfo>> {
    Json(state.registry.snapshots())
}

fn parse_model(model: &str) -> Result<ModelType, ApiError> {
    model
        .parse::<ModelType>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

pub async fn get_records(
    State(state): State<AdminState>,
    Path(model): Path<String>,
) -> Result<Json<Vec<Arc<ModelRecord>>>, ApiError> {
    let model = parse_model(&model)?;
    let handle = state
        .registry
        .acquire_active()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "no active snapshot"))?;
    Ok(Json(handle.records(model)))
}

pub async fn get_record(
    State(state): State<AdminState>,
    Path((model, key)): Path<(String, String)>,
) -> Result<Json<Arc<ModelRecord>>, ApiError> {
    let model = parse_model(&model)?;
    let handle = state
        .registry
        .acquire_active()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "no active snapshot"))?;
    handle
        .lookup(model, &key)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("no {} named {}", model, key)))
}
