//! Accept loop and per-connection HTTP serving.
//!
//! Each accepted stream is served on its own task with hyper-util's auto
//! builder (HTTP/1.1 or HTTP/2), optionally behind a TLS handshake. All
//! connection tasks are watched by a `GracefulShutdown` so a shutdown request
//! can ask them to finish, and kept in a `JoinSet` so they can be aborted once
//! the grace period is spent.

use std::io;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::{GracefulShutdown, Watcher};
use hyper_util::service::TowerToHyperService;
use tokio::task::JoinSet;

use super::handle::{Drain, ServerHandle, ShutdownRequest};
use super::listener::{Listener, Peer, Stream};
use super::outcome::Outcome;
use super::tls::TlsAcceptor;
use crate::error::Error;

/// Pause after an accept error caused by resource exhaustion.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serve `router` on `listener` until shutdown is requested through `handle`
/// or accepting fails.
///
/// Returns [`Outcome::Closed`] when a requested shutdown drained every
/// connection in time, and [`Error::ForcedShutdown`] when connections had to
/// be aborted at the deadline.
pub async fn serve(
    listener: Listener,
    acceptor: Option<TlsAcceptor>,
    router: Router,
    handle: ServerHandle,
) -> Outcome {
    // Publishes `Drain::Stopped` on any exit that did not report otherwise.
    let reporter = DrainReporter(handle.clone());

    let mut requests = handle.shutdown_requests();
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();
    let builder = Builder::new(TokioExecutor::new());

    let request = loop {
        tokio::select! {
            biased;

            request = requests.requested() => break request,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let connection = Connection {
                        stream,
                        peer,
                        acceptor: acceptor.clone(),
                        service: TowerToHyperService::new(router.clone()),
                        builder: builder.clone(),
                    };
                    let watcher = graceful.watcher();
                    let guard = handle.track_connection();
                    connections.spawn(async move {
                        let _guard = guard;
                        connection.run(watcher).await;
                    });
                }
                Err(e) if is_connection_error(&e) => {
                    tracing::debug!(error = %e, "Connection failed during accept");
                }
                Err(e) if is_resource_exhausted(&e) => {
                    tracing::warn!(error = %e, backoff_ms = ACCEPT_BACKOFF.as_millis() as u64, "Accept failed, backing off");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Accept failed, stopping server");
                    return Outcome::Failed(Error::Serve(e));
                }
            },

            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    };

    // Closing the listener is what turns this run into a deliberate close.
    drop(listener);
    tracing::info!(
        connections = handle.connection_count(),
        grace_ms = request.grace.as_millis() as u64,
        "Stopped accepting connections, draining"
    );

    let drained = drain(request, graceful, connections, &handle).await;
    reporter.finish(drained, request.grace)
}

async fn drain(
    request: ShutdownRequest,
    graceful: GracefulShutdown,
    mut connections: JoinSet<()>,
    handle: &ServerHandle,
) -> Drain {
    match tokio::time::timeout_at(request.deadline, graceful.shutdown()).await {
        Ok(()) => {
            connections.shutdown().await;
            tracing::info!("All connections drained");
            Drain::Graceful
        }
        Err(_) => {
            let remaining = handle.connection_count();
            tracing::warn!(remaining, "Grace period elapsed, aborting open connections");
            connections.shutdown().await;
            Drain::Forced { remaining }
        }
    }
}

struct DrainReporter(ServerHandle);

impl DrainReporter {
    fn finish(self, drain: Drain, grace: Duration) -> Outcome {
        self.0.report(drain);
        match drain {
            Drain::Forced { remaining } => {
                Outcome::Failed(Error::ForcedShutdown { grace, remaining })
            }
            Drain::Graceful | Drain::Stopped => Outcome::Closed,
        }
    }
}

impl Drop for DrainReporter {
    fn drop(&mut self) {
        self.0.report(Drain::Stopped);
    }
}

/// One accepted connection, ready to be served on its own task.
struct Connection {
    stream: Stream,
    peer: Peer,
    acceptor: Option<TlsAcceptor>,
    service: TowerToHyperService<Router>,
    builder: Builder<TokioExecutor>,
}

impl Connection {
    async fn run(self, watcher: Watcher) {
        let Self {
            stream,
            peer,
            acceptor,
            service,
            builder,
        } = self;
        tracing::trace!(%peer, "Connection accepted");

        let result = match acceptor {
            None => {
                let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
                watcher.watch(conn).await
            }
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls) => {
                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(tls), service);
                    watcher.watch(conn).await
                }
                Err(e) => {
                    tracing::debug!(%peer, error = %e, "TLS handshake failed");
                    return;
                }
            },
        };

        if let Err(e) = result {
            tracing::debug!(%peer, error = %e, "Connection closed with error");
        }
        tracing::trace!(%peer, "Connection closed");
    }
}

/// Errors that only affect the connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Out of file descriptors or memory; worth retrying after a pause.
fn is_resource_exhausted(e: &io::Error) -> bool {
    // ENOMEM, ENFILE, EMFILE
    cfg!(unix) && matches!(e.raw_os_error(), Some(12 | 23 | 24))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_not_fatal() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
        ] {
            assert!(is_connection_error(&io::Error::from(kind)));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_descriptor_exhaustion_is_retried() {
        assert!(is_resource_exhausted(&io::Error::from_raw_os_error(24)));
        assert!(is_resource_exhausted(&io::Error::from_raw_os_error(23)));
    }

    #[test]
    fn test_other_accept_errors_are_fatal() {
        let e = io::Error::new(io::ErrorKind::InvalidInput, "bad socket");
        assert!(!is_connection_error(&e));
        assert!(!is_resource_exhausted(&e));
    }

    #[tokio::test]
    async fn test_reporter_drop_publishes_stopped() {
        let handle = ServerHandle::new();
        drop(DrainReporter(handle.clone()));
        assert_eq!(handle.drain_report(), Some(Drain::Stopped));
    }

    #[tokio::test]
    async fn test_idle_server_closes_on_shutdown() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let handle = ServerHandle::new();
        let serving = tokio::spawn(serve(listener, None, Router::new(), handle.clone()));

        handle.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(serving.await.unwrap(), Outcome::Closed));
        assert_eq!(handle.drain_report(), Some(Drain::Graceful));
    }
}
