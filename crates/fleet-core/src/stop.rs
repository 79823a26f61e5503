//! Cooperative stop signal shared by the poll loop and the operator.
//!
//! The signal is set at most once and observed by any number of waiters.
//! Setting it never blocks. Every suspension point in the loop (backend
//! calls, the inter-cycle wait, the start of each file write) checks it,
//! so a stop takes effect within one I/O operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Broadcast stop signal. Clones observe and set the same signal.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    /// Create an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    ///
    /// Returns `true` for the call that actually set the signal and
    /// `false` for every later call.
    pub fn request_stop(&self) -> bool {
        let first = !self.requested.swap(true, Ordering::AcqRel);
        self.token.cancel();
        first
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire) || self.token.is_cancelled()
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }

    /// Sleep for `duration` unless a stop arrives first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the wait was
    /// cut short by a stop.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.token.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_request_sets_signal() {
        let stop = StopSignal::new();
        assert!(!stop.is_stop_requested());

        assert!(stop.request_stop());
        assert!(!stop.request_stop());
        assert!(stop.is_stop_requested());
    }

    #[test]
    fn clones_share_the_signal() {
        let stop = StopSignal::new();
        let observer = stop.clone();
        let _ = stop.request_stop();
        assert!(observer.is_stop_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_stop() {
        let stop = StopSignal::new();
        let start = tokio::time::Instant::now();

        assert!(stop.sleep(Duration::from_secs(10)).await);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cuts_sleep_short() {
        let stop = StopSignal::new();
        let setter = stop.clone();
        let start = tokio::time::Instant::now();

        let (completed, ()) = tokio::join!(stop.sleep(Duration::from_secs(60)), async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            let _ = setter.request_stop();
        });

        assert!(!completed);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn all_waiters_wake() {
        let stop = StopSignal::new();
        let a = stop.clone();
        let b = stop.clone();
        let _ = stop.request_stop();

        tokio::join!(a.stopped(), b.stopped());
    }
}
