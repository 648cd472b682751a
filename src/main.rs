//! Gateway configuration sync daemon (v1)
//!
//! Keeps an in-memory, snapshot-versioned copy of the gateway's catalogs,
//! products, APIs and subscriptions in step with the management plane.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                      CONFIG SYNC                          │
//!                 │                                                           │
//!  management     │  ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌─────────┐ │
//!  plane ─────────┼─▶│  bundle  │──▶│ resolver │──▶│  store  │──▶│snapshot │ │
//!                 │  │ fetcher  │   │          │   │ (stage) │   │registry │ │
//!  fallback dir ──┼─▶└──────────┘   └──────────┘   └─────────┘   └────┬────┘ │
//!                 │        ▲                                           │      │
//!                 │        │  refresh scheduler (one cycle at a time)  │      │
//!                 │        └───────────────────────────────────────────┘      │
//!                 │                                                    │      │
//!                 │                                acquire_active / lookup    │
//!                 │                                                    ▼      │
//!                 │                                       gateway readers,    │
//!                 │                                       admin API           │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use gateway_config_sync::admin::{setup_admin_router, AdminState};
use gateway_config_sync::bundle::{BundleFetcher, HttpPuller};
use gateway_config_sync::config::watcher::BundleWatcher;
use gateway_config_sync::config::{load_config, DeploymentMode};
use gateway_config_sync::lifecycle::signals::{nudge_on_hangup, shutdown_on_signal};
use gateway_config_sync::observability::{logging, metrics};
use gateway_config_sync::refresh::{RefreshScheduler, SchedulerSettings};
use gateway_config_sync::{ModelStore, Shutdown, SnapshotRegistry, SyncError};

#[derive(Parser)]
#[command(name = "config-sync")]
#[command(about = "Gateway configuration synchronization daemon", long_about = None)]
struct Args {
    /// Settings file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability);

    let mode = config.deployment_mode();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = %mode,
        management_host = ?config.sync.management_host,
        config_dir = %config.sync.config_dir.display(),
        refresh_interval_secs = config.sync.refresh_interval_secs,
        "config-sync starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let registry = SnapshotRegistry::new(Arc::new(ModelStore::new()));
    let shutdown = Arc::new(Shutdown::new());
    let (ready_tx, ready_rx) = oneshot::channel();
    let (nudge_tx, nudge_rx) = mpsc::channel(1);

    let plane = HttpPuller::new(config.sync.fetch_timeout())?;
    let fetcher = BundleFetcher::new(plane, config.sync.fetch_timeout());
    let scheduler = RefreshScheduler::new(
        SchedulerSettings::from_config(&config),
        fetcher,
        registry.clone(),
    )
    .with_readiness(ready_tx)
    .with_nudges(nudge_rx);

    let _watcher = if mode == DeploymentMode::LocalAuthoring && config.sync.watch_local {
        match BundleWatcher::new(&config.sync.config_dir, nudge_tx.clone()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Fragment watcher unavailable, relying on periodic refresh");
                None
            }
        }
    } else {
        None
    };

    let scheduler_task = tokio::spawn(scheduler.run(shutdown.subscribe()));
    tokio::spawn(shutdown_on_signal(shutdown.clone()));
    tokio::spawn(nudge_on_hangup(nudge_tx));

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        let router = setup_admin_router(AdminState::new(
            registry.clone(),
            config.admin.clone(),
            mode,
        ))
        .layer(TraceLayer::new_for_http());
        let mut admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    let startup_timeout = config.sync.startup_timeout();
    match tokio::time::timeout(startup_timeout, ready_rx).await {
        Ok(Ok(ready)) => {
            tracing::info!(
                snapshot = %ready.snapshot,
                source = ?ready.source,
                dir = %ready.dir.display(),
                "LOADED: configuration ready"
            );
        }
        Ok(Err(_)) => {
            shutdown.trigger();
            let error = SyncError::NoConfiguration(
                "refresh scheduler stopped before any snapshot was promoted".into(),
            );
            tracing::error!(error = %error, "Startup failed");
            return Err(error.into());
        }
        Err(_) => {
            shutdown.trigger();
            let error = SyncError::NoConfiguration(format!(
                "no snapshot promoted within {:?}",
                startup_timeout
            ));
            tracing::error!(error = %error, "Startup failed");
            return Err(error.into());
        }
    }

    scheduler_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
