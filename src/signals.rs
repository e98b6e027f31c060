//! Process signals.
//!
//! SIGHUP rebuilds the outbound transport and publishes it through the
//! [`TransportHandle`]; sends already in flight finish on the old one.
//! SIGINT and SIGTERM start a graceful shutdown.

use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

use crate::collaborators::{Transport, TransportHandle};

/// Install the SIGHUP handler. `rebuild` runs on every hangup; a failed
/// rebuild keeps the current transport.
pub fn reload_transport_on_hangup<F>(handle: Arc<TransportHandle>, rebuild: F) -> std::io::Result<()>
where
    F: Fn() -> Result<Box<dyn Transport>, String> + Send + 'static,
{
    let mut hangups = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            tracing::info!("Received SIGHUP - rebuilding transport");
            match rebuild() {
                Ok(transport) => handle.replace(transport),
                Err(e) => tracing::error!(error = %e, "Transport rebuild failed, keeping current transport"),
            }
        }
    });
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM - shutting down"),
                _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT - shutting down"),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Could not wait for SIGINT");
            }
        }
    }
}
