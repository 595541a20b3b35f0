//! gracehold: graceful lifecycle for HTTP services.
//!
//! Binds a TCP or Unix socket listener, serves an axum router on it (plain or
//! TLS), and shuts it down within a bounded grace period when interrupted.
//! Each run ends in exactly one outcome: a requested close is success, any
//! other ending is the error that caused it.

pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;

pub use self::error::{Error, Result};
pub use self::http::{run, serve_until, start_server, RunningServer, ServerHandle};
