//! OS signal handling.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::lifecycle::Shutdown;

/// Wait for Ctrl-C / SIGTERM, then trigger shutdown.
pub async fn shutdown_on_signal(shutdown: Arc<Shutdown>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
    shutdown.trigger();
}

/// Forward SIGHUP as a refresh nudge until the channel closes.
#[cfg(unix)]
pub async fn nudge_on_hangup(nudge_tx: mpsc::Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGHUP handler");
            return;
        }
    };
    while hangup.recv().await.is_some() {
        tracing::info!("SIGHUP received, requesting refresh");
        if let Err(mpsc::error::TrySendError::Closed(_)) = nudge_tx.try_send(()) {
            break;
        }
    }
}

#[cfg(not(unix))]
pub async fn nudge_on_hangup(_nudge_tx: mpsc::Sender<()>) {}
