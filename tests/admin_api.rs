//! Admin router over the read interface.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use gateway_config_sync::admin::{setup_admin_router, AdminState};
use gateway_config_sync::config::{AdminConfig, DeploymentMode};

mod common;
use common::{FixturePlane, Harness};

const KEY: &str = "test-admin-key";

fn router(harness: &Harness) -> Router {
    let config = AdminConfig {
        enabled: true,
        api_key: KEY.to_string(),
        bind_address: "127.0.0.1:0".to_string(),
    };
    setup_admin_router(AdminState::new(
        harness.registry.clone(),
        config,
        DeploymentMode::Managed,
    ))
}

fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_requests_without_valid_key_are_rejected() {
    let harness = Harness::new(FixturePlane::default());
    let app = router(&harness);

    let response = app.clone().oneshot(get("/admin/status", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(get("/admin/status", Some("wrong"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_before_first_promotion() {
    let harness = Harness::new(FixturePlane::default());
    let app = router(&harness);

    let response = app
        .clone()
        .oneshot(get("/admin/status", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ready"], false);
    assert_eq!(body["active_snapshot"], Value::Null);
    assert_eq!(body["mode"], "managed");

    let response = app
        .oneshot(get("/admin/records/api/api-1", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_record_lookup_reads_active_snapshot() {
    let harness = Harness::new(FixturePlane::serving(common::managed_bundle("r1")));
    let mut scheduler = harness.scheduler(harness.settings(DeploymentMode::Managed, None));
    let snapshot = scheduler.run_cycle().await.snapshot().unwrap();
    let app = router(&harness);

    let response = app
        .clone()
        .oneshot(get("/admin/records/apis/api-1", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["key"], "api-1");
    assert_eq!(body["model_type"], "api");
    assert_eq!(body["snapshot_id"], snapshot.as_uuid().to_string());
    assert_eq!(body["document"]["name"], "weather");

    let response = app
        .clone()
        .oneshot(get("/admin/records/api/missing", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get("/admin/records/widgets/x", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(get("/admin/records/subscription", Some(KEY)))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = app
        .oneshot(get("/admin/snapshots", Some(KEY)))
        .await
        .unwrap();
    let body = json_body(response).await;
    let snapshots = body.as_array().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0]["state"], "ACTIVE");
    assert_eq!(snapshots[0]["refcount"], 0);
}
