//! HTTP/HTTPS server startup logic.
//!
//! Supports two transport modes on either socket family:
//! - Plain: no certificate configured
//! - TLS: user-provided certificate and key files
//!
//! Startup (endpoint validation, certificate loading, binding) happens before
//! any task is spawned, and its errors are returned directly. After that the
//! serve loop and the interrupt watcher run in the background and the run's
//! single outcome is collected with [`RunningServer::wait`].

use std::future::Future;

use axum::Router;

use super::endpoint::Security;
use super::handle::ServerHandle;
use super::listener::{Listener, LocalAddr};
use super::outcome::{self, Outcome, OutcomeReceiver};
use super::serve::serve;
use super::shutdown;
use super::tls::{self, TlsAcceptor};
use crate::config::ServerConfig;
use crate::error::Error;

/// A started server whose outcome has not been collected yet.
#[derive(Debug)]
pub struct RunningServer {
    handle: ServerHandle,
    local_addr: LocalAddr,
    outcome: OutcomeReceiver,
}

impl RunningServer {
    /// Handle for inspecting or shutting down the server directly.
    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    pub fn local_addr(&self) -> &LocalAddr {
        &self.local_addr
    }

    /// Block until the server stops.
    ///
    /// `Ok(())` after a requested shutdown that drained in time; otherwise the
    /// error that ended the run.
    pub async fn wait(self) -> Result<(), Error> {
        self.outcome.wait().await
    }
}

/// Start serving `app` as configured, shutting down when `interrupt` resolves.
///
/// Returns once the listener is bound and the background tasks are running.
pub async fn start_server<F>(
    app: Router,
    config: &ServerConfig,
    interrupt: F,
) -> Result<RunningServer, Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let endpoint = config.endpoint();
    let address = endpoint.address();

    let tls = match endpoint.security()? {
        Security::Plain => {
            tracing::info!(%address, "Starting HTTP server (no TLS)");
            None
        }
        Security::Tls { cert, key } => {
            tracing::info!(
                %address,
                cert = %cert.display(),
                key = %key.display(),
                "Starting HTTPS server"
            );
            let rustls_config = tls::load(&cert, &key).await?;
            Some((rustls_config, cert, key))
        }
    };

    let listener = Listener::bind(address).await?;
    let local_addr = listener.local_addr().map_err(|source| Error::Bind {
        address: address.to_string(),
        source,
    })?;
    tracing::info!(addr = %local_addr, "Listening");

    let handle = ServerHandle::new();
    let (slot, receiver) = outcome::channel();

    let acceptor = tls.map(|(rustls_config, cert, key)| {
        if config.reload_on_sighup {
            tls::spawn_reload_handler(rustls_config.clone(), cert, key, handle.clone());
        }
        TlsAcceptor::new(rustls_config)
    });

    let serve_handle = handle.clone();
    let serve_slot = slot.clone();
    tokio::spawn(async move {
        let result = serve(listener, acceptor, app, serve_handle).await;
        if let Outcome::Failed(e) = &result {
            tracing::error!(error = %e, "Server stopped with error");
        }
        serve_slot.offer(result);
    });

    shutdown::spawn_interrupt_watcher(interrupt, handle.clone(), config.shutdown_grace(), slot);

    Ok(RunningServer {
        handle,
        local_addr,
        outcome: receiver,
    })
}

/// Serve until `interrupt` resolves or the server fails.
pub async fn serve_until<F>(app: Router, config: &ServerConfig, interrupt: F) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    start_server(app, config, interrupt).await?.wait().await
}

/// Serve until Ctrl+C/SIGTERM or failure.
///
/// This function blocks until the server shuts down.
pub async fn run(app: Router, config: &ServerConfig) -> Result<(), Error> {
    serve_until(app, config, shutdown::shutdown_signal()).await
}
