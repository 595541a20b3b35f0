//! Liveness probe.
//!
//! Returns 200 OK while the process is serving. A server that is draining has
//! already stopped accepting, so new probes fail at connect time instead.

pub async fn health() -> &'static str {
    "ok"
}
