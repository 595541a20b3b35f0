//! Single-delivery handoff of the server's terminal outcome.
//!
//! Two tasks may produce an outcome (the serve loop, and the interrupt watcher
//! when shutdown fails) but the caller reads exactly one. The slot hands out
//! its `oneshot` sender to the first `offer`; every later offer finds it gone
//! and returns at once, so a losing producer never blocks.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::error::Error;

/// How a server run ended.
#[derive(Debug)]
pub enum Outcome {
    /// The listener was closed by a requested shutdown.
    Closed,
    Failed(Error),
}

impl Outcome {
    /// Deliberate close is success; anything else is the run's failure.
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Self::Closed => Ok(()),
            Self::Failed(e) => Err(e),
        }
    }
}

/// Create a connected slot and receiver.
pub fn channel() -> (OutcomeSlot, OutcomeReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        OutcomeSlot {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        OutcomeReceiver { rx },
    )
}

/// Producer side. Clone freely; only the first offer is delivered.
#[derive(Debug, Clone)]
pub struct OutcomeSlot {
    tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl OutcomeSlot {
    /// Deliver `outcome` if nothing has been delivered yet.
    ///
    /// Returns whether this offer won. Never blocks.
    pub fn offer(&self, outcome: Outcome) -> bool {
        let sender = match self.tx.lock() {
            Ok(mut tx) => tx.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => {
                tracing::debug!(?outcome, "Outcome already delivered, dropping");
                false
            }
        }
    }
}

/// Consumer side, read exactly once.
#[derive(Debug)]
pub struct OutcomeReceiver {
    rx: oneshot::Receiver<Outcome>,
}

impl OutcomeReceiver {
    /// Block until an outcome arrives and normalize it.
    ///
    /// If every producer went away without offering (a task panicked), the
    /// run is reported as [`Error::Aborted`].
    pub async fn wait(self) -> Result<(), Error> {
        match self.rx.await {
            Ok(outcome) => outcome.into_result(),
            Err(_) => Err(Error::Aborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test]
    async fn test_closed_is_success() {
        let (slot, receiver) = channel();
        assert!(slot.offer(Outcome::Closed));
        receiver.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_is_returned_verbatim() {
        let (slot, receiver) = channel();
        slot.offer(Outcome::Failed(Error::Serve(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "listener went away",
        ))));

        match receiver.wait().await {
            Err(Error::Serve(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
                assert_eq!(e.to_string(), "listener went away");
            }
            other => panic!("expected serve error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_offer_wins() {
        let (slot, receiver) = channel();
        let other = slot.clone();

        assert!(other.offer(Outcome::Failed(Error::Aborted)));
        assert!(!slot.offer(Outcome::Closed));

        assert!(matches!(receiver.wait().await, Err(Error::Aborted)));
    }

    #[test]
    fn test_offer_after_receiver_dropped_does_not_block() {
        let (slot, receiver) = channel();
        drop(receiver);
        assert!(!slot.offer(Outcome::Closed));
        assert!(!slot.offer(Outcome::Closed));
    }

    #[tokio::test]
    async fn test_all_producers_gone_is_aborted() {
        let (slot, receiver) = channel();
        let clone = slot.clone();
        drop(slot);
        drop(clone);
        assert!(matches!(receiver.wait().await, Err(Error::Aborted)));
    }
}
