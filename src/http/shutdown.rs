//! Interrupt handling and graceful shutdown.
//!
//! Handles:
//! - SIGINT/SIGTERM: Graceful shutdown with connection draining
//!
//! The interrupt source is any future, so callers (and tests) can drive
//! shutdown without touching process signals. [`shutdown_signal`] is the
//! OS-backed default.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::handle::ServerHandle;
use super::outcome::{Outcome, OutcomeSlot};

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
///
/// If a handler cannot be installed the error is logged and that source
/// never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

/// Shut the server down when `interrupt` resolves.
///
/// Waits for the first interrupt, then asks `handle` to stop within `grace`.
/// A failed shutdown is offered to `outcome`; a successful one writes nothing
/// and leaves the serve loop to report the close. If the server stops on its
/// own first, the watcher exits without shutting anything down.
pub fn spawn_interrupt_watcher<F>(
    interrupt: F,
    handle: ServerHandle,
    grace: Duration,
    outcome: OutcomeSlot,
) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt => {}
            _ = handle.stopped() => {
                tracing::debug!("Server stopped before any interrupt");
                return;
            }
        }

        tracing::info!(
            grace_ms = grace.as_millis() as u64,
            "Received interrupt, shutting down"
        );

        if let Err(e) = handle.shutdown(grace).await {
            tracing::error!(error = %e, "Graceful shutdown failed");
            outcome.offer(Outcome::Failed(e));
        }
    })
}
