//! End-to-end refresh cycles against scripted bundles.

use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use gateway_config_sync::config::DeploymentMode;
use gateway_config_sync::lifecycle::Shutdown;
use gateway_config_sync::refresh::{BundleSource, CycleOutcome};
use gateway_config_sync::snapshot::{RegistryError, SnapshotState};
use gateway_config_sync::store::ModelType;
use gateway_config_sync::SyncError;

mod common;
use common::{FixturePlane, Harness};

fn documents(harness: &Harness, model: ModelType) -> Vec<(String, Value)> {
    let handle = harness.registry.acquire_active().unwrap();
    let mut docs: Vec<(String, Value)> = handle
        .records(model)
        .iter()
        .map(|r| (r.key.clone(), r.document.clone()))
        .collect();
    docs.sort_by(|a, b| a.0.cmp(&b.0));
    docs
}

#[tokio::test]
async fn test_fresh_bundle_is_promoted_and_persisted() {
    let harness = Harness::new(FixturePlane::serving(common::managed_bundle("r1")));
    let (ready_tx, ready_rx) = oneshot::channel();
    let mut scheduler = harness
        .scheduler(harness.settings(DeploymentMode::Managed, None))
        .with_readiness(ready_tx);

    let (snapshot, source, dir, records, superseded) = match scheduler.run_cycle().await {
        CycleOutcome::Promoted {
            snapshot,
            source,
            dir,
            records,
            superseded,
        } => (snapshot, source, dir, records, superseded),
        other => panic!("expected promotion, got {:?}", other),
    };

    assert_eq!(source, BundleSource::Fresh);
    assert_eq!(records, 5);
    assert_eq!(superseded, None);
    assert_eq!(harness.registry.active_id(), Some(snapshot));
    assert!(dir.starts_with(harness.work_dir()));

    let handle = harness.registry.acquire_active().unwrap();
    let api = handle.lookup(ModelType::Api, "api-2").unwrap();
    assert_eq!(api.document["name"], "stock");
    assert_eq!(api.snapshot_id, snapshot);
    assert!(handle.lookup(ModelType::Subscription, "sub-1").is_some());

    assert_eq!(harness.pointer().load().unwrap(), Some(dir.clone()));
    assert_eq!(scheduler.fallback_dir(), Some(dir.as_path()));

    let ready = ready_rx.await.unwrap();
    assert_eq!(ready.snapshot, snapshot);
    assert_eq!(ready.source, BundleSource::Fresh);
}

#[tokio::test]
async fn test_fetch_failure_promotes_fallback_without_pointer_rewrite() {
    let plane = FixturePlane::serving(common::managed_bundle("r1"));
    plane.set_failing(true);
    let harness = Harness::new(plane);
    let fallback = harness.root.path().join("last-good");
    common::write_files(&fallback, &common::managed_bundle("fallback"));

    let (ready_tx, ready_rx) = oneshot::channel();
    let mut scheduler = harness
        .scheduler(harness.settings(DeploymentMode::Managed, Some(fallback.clone())))
        .with_readiness(ready_tx);

    let outcome = scheduler.run_cycle().await;
    assert!(outcome.is_promoted(), "{:?}", outcome);
    assert_eq!(harness.plane.calls(), 1);

    let ready = ready_rx.await.unwrap();
    assert_eq!(ready.source, BundleSource::Fallback);
    assert_eq!(ready.dir, fallback);

    assert_eq!(harness.pointer().load().unwrap(), None);
    assert!(common::bundle_dirs(&harness.work_dir()).is_empty());

    let handle = harness.registry.acquire_active().unwrap();
    let catalog = handle.lookup(ModelType::Catalog, "cat-1").unwrap();
    assert_eq!(catalog.document["revision"], "fallback");
}

#[tokio::test]
async fn test_no_bundle_and_no_fallback_is_no_configuration() {
    let plane = FixturePlane::default();
    plane.set_failing(true);
    let harness = Harness::new(plane);
    let mut scheduler = harness.scheduler(harness.settings(DeploymentMode::Managed, None));

    match scheduler.run_cycle().await {
        CycleOutcome::Failed {
            snapshot: None,
            error,
            ..
        } => {
            assert!(error.is_fatal());
            assert!(matches!(error, SyncError::NoConfiguration(_)));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(!harness.registry.has_active());
    assert!(harness.registry.snapshots().is_empty());
}

#[tokio::test]
async fn test_malformed_fragment_blocks_whole_snapshot() {
    let harness = Harness::new(FixturePlane::serving(common::managed_bundle("r1")));
    let mut scheduler = harness.scheduler(harness.settings(DeploymentMode::Managed, None));

    let first = scheduler.run_cycle().await;
    let good = first.snapshot().unwrap();
    let good_pointer = harness.pointer().load().unwrap();

    let mut broken = common::managed_bundle("r2");
    broken.push(("products-2.json".to_string(), "[{ \"id\": ".to_string()));
    harness.plane.set_files(broken);

    let (failed, error) = match scheduler.run_cycle().await {
        CycleOutcome::Failed {
            snapshot: Some(failed),
            source: Some(BundleSource::Fresh),
            error,
        } => (failed, error),
        other => panic!("expected failure, got {:?}", other),
    };
    assert!(matches!(
        error,
        SyncError::PromotionSkipped(RegistryError::Unpromotable { count: 1, .. })
    ));

    // siblings parsed fine but were never committed
    assert!(!harness.registry.store().contains_snapshot(failed));
    assert!(harness.registry.info(failed).is_none());
    assert_eq!(harness.registry.active_id(), Some(good));
    let handle = harness.registry.acquire_active().unwrap();
    assert_eq!(
        handle.lookup(ModelType::Api, "api-1").unwrap().document["revision"],
        "r1"
    );

    assert_eq!(harness.pointer().load().unwrap(), good_pointer);
    assert_eq!(common::bundle_dirs(&harness.work_dir()).len(), 1);
}

#[tokio::test]
async fn test_repeated_cycles_yield_identical_records() {
    let harness = Harness::new(FixturePlane::serving(common::managed_bundle("r1")));
    let mut scheduler = harness.scheduler(harness.settings(DeploymentMode::Managed, None));

    let first = scheduler.run_cycle().await.snapshot().unwrap();
    let before: Vec<_> = ModelType::ALL
        .into_iter()
        .map(|m| documents(&harness, m))
        .collect();

    let second = scheduler.run_cycle().await.snapshot().unwrap();
    let after: Vec<_> = ModelType::ALL
        .into_iter()
        .map(|m| documents(&harness, m))
        .collect();

    assert_ne!(first, second);
    assert_eq!(before, after);
    assert_eq!(harness.registry.active_id(), Some(second));
}

#[tokio::test]
async fn test_superseded_fresh_bundles_are_removed() {
    let harness = Harness::new(FixturePlane::serving(common::managed_bundle("r1")));
    let mut scheduler = harness.scheduler(harness.settings(DeploymentMode::Managed, None));

    let mut last = None;
    for revision in ["r1", "r2", "r3", "r4", "r5"] {
        harness.plane.set_files(common::managed_bundle(revision));
        match scheduler.run_cycle().await {
            CycleOutcome::Promoted { dir, .. } => last = Some(dir),
            other => panic!("expected promotion, got {:?}", other),
        }
    }

    let last = last.unwrap();
    assert_eq!(common::bundle_dirs(&harness.work_dir()), vec![last.clone()]);
    assert_eq!(harness.pointer().load().unwrap(), Some(last));
}

#[tokio::test]
async fn test_fresh_promotion_keeps_foreign_fallback_dir() {
    let harness = Harness::new(FixturePlane::serving(common::managed_bundle("r1")));
    let fallback = harness.root.path().join("last-good");
    common::write_files(&fallback, &common::managed_bundle("fallback"));
    let mut scheduler = harness.scheduler(harness.settings(DeploymentMode::Managed, Some(fallback.clone())));

    let dir = match scheduler.run_cycle().await {
        CycleOutcome::Promoted { dir, source, .. } => {
            assert_eq!(source, BundleSource::Fresh);
            dir
        }
        other => panic!("expected promotion, got {:?}", other),
    };

    assert!(fallback.is_dir());
    assert_eq!(scheduler.fallback_dir(), Some(dir.as_path()));
}

#[tokio::test]
async fn test_local_product_inlines_referenced_apis_in_order() {
    let harness = Harness::new(FixturePlane::default());
    let authoring = harness.root.path().join("authoring");
    common::write_local_product(&authoring);

    let (ready_tx, ready_rx) = oneshot::channel();
    let mut scheduler = harness
        .scheduler(harness.settings(DeploymentMode::LocalAuthoring, Some(authoring.clone())))
        .with_readiness(ready_tx);

    let outcome = scheduler.run_cycle().await;
    assert!(outcome.is_promoted(), "{:?}", outcome);
    assert_eq!(harness.plane.calls(), 0);
    assert_eq!(ready_rx.await.unwrap().source, BundleSource::Fallback);

    let handle = harness.registry.acquire_active().unwrap();
    let product = handle
        .lookup(ModelType::Product, "weather-product:1.0.0")
        .unwrap();
    let apis = product.document["apis"].as_array().unwrap();
    assert_eq!(apis.len(), 2);
    assert_eq!(apis[0], common::load_yaml(&authoring.join("weather-api.yaml")));
    assert_eq!(apis[1], common::load_yaml(&authoring.join("stock-api.yaml")));
    assert_eq!(product.document["catalog"], serde_json::json!({}));

    assert!(handle.lookup(ModelType::Api, "weather-api:1.0.0").is_some());
    assert!(handle.lookup(ModelType::Api, "stock-api:2.0.0").is_some());
    assert_eq!(harness.pointer().load().unwrap(), None);
}

#[tokio::test]
async fn test_local_missing_reference_keeps_previous_snapshot() {
    let harness = Harness::new(FixturePlane::default());
    let authoring = harness.root.path().join("authoring");
    common::write_local_product(&authoring);
    let mut scheduler = harness
        .scheduler(harness.settings(DeploymentMode::LocalAuthoring, Some(authoring.clone())));

    let good = scheduler.run_cycle().await.snapshot().unwrap();

    std::fs::remove_file(authoring.join("stock-api.yaml")).unwrap();
    let outcome = scheduler.run_cycle().await;
    assert!(!outcome.is_promoted());
    assert_eq!(harness.registry.active_id(), Some(good));
    // a local authoring directory is never deleted on failure
    assert!(authoring.join("weather-product.yaml").exists());
}

#[tokio::test]
async fn test_blocked_fetch_never_overlaps_cycles() {
    let plane = FixturePlane::serving(common::managed_bundle("r1"));
    plane.hold();
    let harness = Harness::new(plane);

    let (nudge_tx, nudge_rx) = mpsc::channel(1);
    let scheduler = harness
        .scheduler(harness.settings(DeploymentMode::Managed, None))
        .with_nudges(nudge_rx);

    let shutdown = Shutdown::new();
    let task = tokio::spawn(scheduler.run(shutdown.subscribe()));

    common::eventually(|| harness.plane.in_flight() == 1).await;

    // many periods elapse and nudges pile up while the fetch is blocked
    for _ in 0..10 {
        let _ = nudge_tx.try_send(());
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(harness.plane.calls(), 1);
    assert!(!harness.registry.has_active());

    harness.plane.release();
    common::eventually(|| harness.plane.calls() >= 3).await;

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(harness.plane.max_in_flight(), 1);
    let active: Vec<_> = harness
        .registry
        .snapshots()
        .into_iter()
        .filter(|s| s.state == SnapshotState::Active)
        .collect();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn test_nudge_starts_cycle_before_period() {
    let harness = Harness::new(FixturePlane::serving(common::managed_bundle("r1")));
    let mut settings = harness.settings(DeploymentMode::Managed, None);
    settings.period = Duration::from_secs(3600);

    let (nudge_tx, nudge_rx) = mpsc::channel(1);
    let scheduler = harness.scheduler(settings).with_nudges(nudge_rx);
    let shutdown = Shutdown::new();
    let task = tokio::spawn(scheduler.run(shutdown.subscribe()));

    common::eventually(|| harness.registry.has_active()).await;
    nudge_tx.send(()).await.unwrap();
    common::eventually(|| harness.plane.calls() == 2).await;

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(harness.plane.calls(), 2);
}
