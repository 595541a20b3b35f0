//! Error type shared by every stage of the server lifecycle.
//!
//! Startup failures (bind, TLS, configuration) are returned synchronously from
//! [`start_server`](crate::http::start_server). Everything that happens after
//! the background tasks are launched reaches the caller through the outcome
//! slot instead.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid listen address: {0:?}")]
    InvalidAddress(String),

    #[error("TLS certificate and key must be configured together (cert: {cert:?}, key: {key:?})")]
    IncompleteTls {
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
    },

    #[error("Failed to load TLS certificate {} / key {}: {source}", .cert.display(), .key.display())]
    Tls {
        cert: PathBuf,
        key: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] io::Error),

    #[error("Shutdown grace period of {grace:?} elapsed with {remaining} connection(s) still open")]
    ForcedShutdown { grace: Duration, remaining: usize },

    #[error("Server tasks exited without reporting an outcome")]
    Aborted,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
