//! Shutdown handle shared by the serve loop and whoever asks it to stop.
//!
//! The handle carries two watch channels: the shutdown request (written once by
//! [`ServerHandle::shutdown`], read by the serve loop) and the drain report
//! (written once by the serve loop when it stops, read by `shutdown`).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::Error;

/// How the serve loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Every connection finished within the grace period.
    Graceful,
    /// The grace period elapsed; `remaining` connections were aborted.
    Forced { remaining: usize },
    /// The loop exited without a shutdown request (failure or panic).
    Stopped,
}

/// A shutdown request as seen by the serve loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ShutdownRequest {
    pub(crate) deadline: Instant,
    pub(crate) grace: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerHandle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    request: watch::Sender<Option<ShutdownRequest>>,
    drain: watch::Sender<Option<Drain>>,
    shutting_down: AtomicBool,
    connections: AtomicUsize,
}

impl ServerHandle {
    pub fn new() -> Self {
        let (request, _) = watch::channel(None);
        let (drain, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                request,
                drain,
                shutting_down: AtomicBool::new(false),
                connections: AtomicUsize::new(0),
            }),
        }
    }

    /// Stop accepting, let open connections finish for up to `grace`, then
    /// abort whatever is left.
    ///
    /// Resolves once the serve loop has stopped. Only the first call does any
    /// work; later calls return `Ok(())` immediately.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), Error> {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already in progress, ignoring request");
            return Ok(());
        }

        let mut drain = self.inner.drain.subscribe();
        self.inner.request.send_replace(Some(ShutdownRequest {
            deadline: Instant::now() + grace,
            grace,
        }));

        let report = drain.wait_for(Option::is_some).await.ok().and_then(|r| *r);
        match report {
            Some(Drain::Forced { remaining }) => Err(Error::ForcedShutdown { grace, remaining }),
            _ => Ok(()),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Number of connections currently being served.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// The serve loop's drain report, once it has stopped.
    pub fn drain_report(&self) -> Option<Drain> {
        *self.inner.drain.borrow()
    }

    /// Resolves once the serve loop has stopped, for any reason.
    pub async fn stopped(&self) {
        let mut drain = self.inner.drain.subscribe();
        let _ = drain.wait_for(Option::is_some).await;
    }

    pub(crate) fn shutdown_requests(&self) -> ShutdownWatch {
        ShutdownWatch(self.inner.request.subscribe())
    }

    /// Publish how the serve loop stopped. The first report sticks.
    pub(crate) fn report(&self, drain: Drain) {
        self.inner.drain.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(drain);
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn track_connection(&self) -> ConnectionGuard {
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            handle: self.clone(),
        }
    }
}

impl Default for ServerHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the shutdown request, owned by the serve loop.
pub(crate) struct ShutdownWatch(watch::Receiver<Option<ShutdownRequest>>);

impl ShutdownWatch {
    /// Wait until a shutdown is requested. Cancel safe.
    pub(crate) async fn requested(&mut self) -> ShutdownRequest {
        if let Ok(request) = self.0.wait_for(Option::is_some).await {
            if let Some(request) = *request {
                return request;
            }
        }
        // The sender lives in the handle, which the serve loop holds.
        std::future::pending().await
    }
}

/// Decrements the live connection count when dropped.
#[derive(Debug)]
pub(crate) struct ConnectionGuard {
    handle: ServerHandle,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.handle.inner.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stand-in for the serve loop: wait for the request, then report.
    fn fake_serve_loop(handle: &ServerHandle, drain: Drain) -> tokio::task::JoinHandle<()> {
        let handle = handle.clone();
        tokio::spawn(async move {
            let mut requests = handle.shutdown_requests();
            requests.requested().await;
            handle.report(drain);
        })
    }

    #[tokio::test]
    async fn test_graceful_drain_is_ok() {
        let handle = ServerHandle::new();
        let serve = fake_serve_loop(&handle, Drain::Graceful);

        handle.shutdown(Duration::from_secs(1)).await.unwrap();
        serve.await.unwrap();

        assert!(handle.is_shutting_down());
        assert_eq!(handle.drain_report(), Some(Drain::Graceful));
    }

    #[tokio::test]
    async fn test_forced_drain_is_an_error() {
        let handle = ServerHandle::new();
        let _serve = fake_serve_loop(&handle, Drain::Forced { remaining: 3 });

        let err = handle.shutdown(Duration::from_millis(50)).await.unwrap_err();
        match err {
            Error::ForcedShutdown { grace, remaining } => {
                assert_eq!(grace, Duration::from_millis(50));
                assert_eq!(remaining, 3);
            }
            other => panic!("expected ForcedShutdown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_shutdown_returns_immediately() {
        let handle = ServerHandle::new();

        // Nobody reports yet, so the first call stays pending.
        let first = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.shutdown(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        while !handle.is_shutting_down() {
            tokio::task::yield_now().await;
        }

        tokio::time::timeout(Duration::from_millis(100), handle.shutdown(Duration::from_secs(5)))
            .await
            .expect("second shutdown should not wait")
            .unwrap();
        assert!(!first.is_finished());

        handle.report(Drain::Graceful);
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_after_loop_already_stopped() {
        let handle = ServerHandle::new();
        handle.report(Drain::Stopped);

        handle.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(handle.drain_report(), Some(Drain::Stopped));
    }

    #[test]
    fn test_first_report_sticks() {
        let handle = ServerHandle::new();
        handle.report(Drain::Graceful);
        handle.report(Drain::Stopped);
        assert_eq!(handle.drain_report(), Some(Drain::Graceful));
    }

    #[test]
    fn test_connection_guard_counts() {
        let handle = ServerHandle::new();
        assert_eq!(handle.connection_count(), 0);

        let first = handle.track_connection();
        let second = handle.track_connection();
        assert_eq!(handle.connection_count(), 2);

        drop(first);
        assert_eq!(handle.connection_count(), 1);
        drop(second);
        assert_eq!(handle.connection_count(), 0);
    }
}
