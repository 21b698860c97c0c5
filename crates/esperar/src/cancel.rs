//! Cooperative cancellation for in-flight polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Clonable handle that tells every poll sharing it to stop.
///
/// Cancellation is observed between attempts: the poller checks before
/// each sample and races each backoff sleep against the token, so an
/// in-flight probe call is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Fresh, un-cancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the token; every current and future waiter wakes
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Has [`cancel`](Self::cancel) been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the token is cancelled.
    ///
    /// Registers for notification before re-checking the flag so a
    /// cancel landing between the check and the wait is never missed.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
