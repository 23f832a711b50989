//! Relay module types.

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use tokio::sync::watch;

/// Handle to a relay's drain task.
///
/// Awaiting it resolves once the task has published `end` and stopped. A
/// handle obtained after termination resolves immediately, and any number
/// of handles may wait on the same task.
#[derive(Debug, Clone)]
pub struct DrainHandle {
    done_rx: watch::Receiver<bool>,
}

impl DrainHandle {
    pub(crate) const fn new(done_rx: watch::Receiver<bool>) -> Self {
        Self { done_rx }
    }

    /// Whether the drain task has terminated.
    pub fn is_finished(&self) -> bool {
        // A dropped sender means the task is gone (e.g. the source panicked).
        *self.done_rx.borrow() || self.done_rx.has_changed().is_err()
    }

    /// Wait for the drain task to terminate.
    pub async fn wait(mut self) {
        loop {
            if *self.done_rx.borrow_and_update() {
                return;
            }
            if self.done_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl IntoFuture for DrainHandle {
    type Output = ();
    type IntoFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

/// Relay statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Values published on the value channel so far.
    pub values_emitted: u64,
    /// Failures published on the error channel (0 or 1).
    pub errors_emitted: u64,
    /// Whether `cancel` has been called.
    pub cancelled: bool,
    /// Whether the drain task has terminated.
    pub terminated: bool,
}
