//! TLS certificate loading, per-connection handshakes and SIGHUP reload.
//!
//! The certificate pair is loaded once at startup into an axum-server
//! `RustlsConfig`. Each handshake reads the config's current inner
//! `ServerConfig`, so a reload applies to every connection accepted after it.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use tokio_rustls::server::TlsStream;

use super::handle::ServerHandle;
use super::listener::Stream;
use crate::error::Error;

/// Upper bound on a single TLS handshake.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a PEM certificate chain and private key.
pub async fn load(cert: &Path, key: &Path) -> Result<RustlsConfig, Error> {
    // Several rustls providers may be compiled in; pin the one this crate enables.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    RustlsConfig::from_pem_file(cert, key)
        .await
        .map_err(|source| Error::Tls {
            cert: cert.to_path_buf(),
            key: key.to_path_buf(),
            source,
        })
}

/// Server-side handshake using the current certificate.
#[derive(Clone)]
pub struct TlsAcceptor {
    config: RustlsConfig,
}

impl TlsAcceptor {
    pub fn new(config: RustlsConfig) -> Self {
        Self { config }
    }

    pub async fn accept(&self, stream: Stream) -> io::Result<TlsStream<Stream>> {
        let acceptor = tokio_rustls::TlsAcceptor::from(self.config.get_inner());
        match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out")),
        }
    }
}

/// Reload the certificate pair whenever SIGHUP arrives, until the server stops.
///
/// A failed reload is logged and the previous certificate stays in use.
#[cfg(unix)]
pub fn spawn_reload_handler(
    tls_config: RustlsConfig,
    cert_path: PathBuf,
    key_path: PathBuf,
    handle: ServerHandle,
) {
    tokio::spawn(async move {
        let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, certificate reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = handle.stopped() => break,
                received = sighup.recv() => {
                    if received.is_none() {
                        break;
                    }
                }
            }

            tracing::info!("Received SIGHUP, reloading TLS certificates");
            match tls_config.reload_from_pem_file(&cert_path, &key_path).await {
                Ok(()) => {
                    tracing::info!(
                        cert = %cert_path.display(),
                        key = %key_path.display(),
                        "TLS certificates reloaded successfully"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        cert = %cert_path.display(),
                        key = %key_path.display(),
                        "Failed to reload TLS certificates"
                    );
                }
            }
        }
    });
}

/// No-op reload handler for non-Unix platforms.
#[cfg(not(unix))]
pub fn spawn_reload_handler(
    _tls_config: RustlsConfig,
    _cert_path: PathBuf,
    _key_path: PathBuf,
    _handle: ServerHandle,
) {
    tracing::warn!("Certificate hot-reload via SIGHUP not supported on this platform");
}
