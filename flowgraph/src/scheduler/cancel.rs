//! Run-level cancellation token.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Clonable cancellation flag for a run.
///
/// The scheduler checks it at the start of each generation and races every
/// in-flight node execution (and retry backoff sleep) against
/// [`cancelled`](Self::cancelled), so a long-running or retrying node stops
/// promptly instead of finishing its attempt.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation is requested; immediately if it already
    /// was.
    pub async fn cancelled(&self) {
        loop {
            // Register the waiter before reading the flag so a cancel
            // between the check and the await is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// **Scenario**: Clones observe cancellation; cancel is idempotent.
    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    /// **Scenario**: cancelled() resolves for waiters registered before the
    /// cancel, and immediately for ones registered after.
    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter wakes")
            .unwrap();

        // Already cancelled: resolves without a further notify.
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("immediate");
    }
}
