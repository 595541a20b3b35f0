//! HTTP server lifecycle with TLS support.
//!
//! This module starts a listener, serves an axum router on it, and stops it
//! gracefully. Listeners can be:
//! - **TCP**: any `host:port` address
//! - **Unix**: `unix:/path/to.sock`, for same-host clients
//!
//! Either kind serves plain HTTP, or HTTPS when a certificate and key are
//! configured. The lifecycle includes:
//! - Graceful shutdown on SIGINT/SIGTERM (or any injected interrupt future)
//!   with a bounded grace period
//! - Certificate hot-reload via SIGHUP (TLS mode)
//! - A single terminal outcome per run, where a requested close is success

mod endpoint;
mod handle;
mod listener;
mod outcome;
mod serve;
mod server;
mod shutdown;
mod tls;

pub use endpoint::{Endpoint, Security};
pub use handle::{Drain, ServerHandle};
pub use listener::{Listener, LocalAddr, Peer, Stream, UNIX_PREFIX};
pub use outcome::{channel as outcome_channel, Outcome, OutcomeReceiver, OutcomeSlot};
pub use serve::serve;
pub use server::{run, serve_until, start_server, RunningServer};
pub use shutdown::{shutdown_signal, spawn_interrupt_watcher};
pub use tls::{load as load_tls, spawn_reload_handler, TlsAcceptor, TLS_HANDSHAKE_TIMEOUT};
