//! Graceful shutdown coordination via `CancellationToken`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// How a drain finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every handler finished on its own.
    Completed,
    /// The drain timeout expired; open connections were sent a Close frame
    /// and then finished.
    ClosedAfterTimeout,
}

/// Coordinates shutdown between the signal source, the accept loop and the
/// connection handlers.
///
/// The shutdown token is cancelled exactly once. A second token, fired only
/// when a bounded drain runs out of time, asks handlers to close their
/// connections.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    close: CancellationToken,
    initiated: AtomicBool,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            close: CancellationToken::new(),
            initiated: AtomicBool::new(false),
        }
    }

    /// Get a clone of the close-connections token.
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Initiate shutdown.
    ///
    /// Returns `true` only for the call that actually initiated it; any
    /// later or concurrent call is a no-op returning `false`.
    pub fn shutdown(&self) -> bool {
        if self.initiated.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!("shutdown requested");
        self.token.cancel();
        true
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been initiated.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Ask every open connection to close.
    pub fn close_connections(&self) {
        self.close.cancel();
    }

    /// Close `tracker` and wait for every tracked task to finish.
    ///
    /// Without a timeout this waits unconditionally. With one, the close
    /// token fires when it expires and the wait continues until handlers
    /// have completed their close handshakes.
    pub async fn drain(&self, tracker: &TaskTracker, timeout: Option<Duration>) -> DrainOutcome {
        let _ = tracker.close();
        info!(
            task_count = tracker.len(),
            timeout = ?timeout,
            "waiting for connections to finish"
        );

        let Some(timeout) = timeout else {
            tracker.wait().await;
            return DrainOutcome::Completed;
        };

        if tokio::time::timeout(timeout, tracker.wait()).await.is_ok() {
            return DrainOutcome::Completed;
        }

        warn!(
            remaining = tracker.len(),
            "drain timed out after {timeout:?}, closing open connections"
        );
        self.close_connections();
        tracker.wait().await;
        DrainOutcome::ClosedAfterTimeout
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn shutdown_sets_flag() {
        let coord = ShutdownCoordinator::new();
        assert!(coord.shutdown());
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn multiple_shutdown_calls_idempotent() {
        let coord = ShutdownCoordinator::new();
        assert!(coord.shutdown());
        assert!(!coord.shutdown());
        assert!(!coord.shutdown());
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn shutdown_does_not_close_connections() {
        let coord = ShutdownCoordinator::new();
        let close = coord.close_token();
        let _ = coord.shutdown();
        assert!(!close.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_shutdown_initiates_once() {
        let coord = Arc::new(ShutdownCoordinator::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let coord = Arc::clone(&coord);
                tokio::spawn(async move { coord.shutdown() })
            })
            .collect();

        let mut initiated = 0;
        for handle in handles {
            if handle.await.unwrap() {
                initiated += 1;
            }
        }
        assert_eq!(initiated, 1);
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let coord = Arc::new(ShutdownCoordinator::new());
        let waiter = Arc::clone(&coord);

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        let _ = coord.shutdown();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn drain_awaits_all_tasks() {
        let coord = Arc::new(ShutdownCoordinator::new());
        let tracker = TaskTracker::new();
        let waiter = Arc::clone(&coord);

        let _ = tracker.spawn(async move {
            waiter.cancelled().await;
        });

        let _ = coord.shutdown();
        let outcome = coord.drain(&tracker, None).await;
        assert_eq!(outcome, DrainOutcome::Completed);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn drain_with_no_tasks_completes() {
        let coord = ShutdownCoordinator::new();
        let tracker = TaskTracker::new();
        let outcome = coord.drain(&tracker, Some(Duration::from_millis(50))).await;
        assert_eq!(outcome, DrainOutcome::Completed);
    }

    #[tokio::test]
    async fn drain_timeout_fires_close_token() {
        let coord = ShutdownCoordinator::new();
        let tracker = TaskTracker::new();
        let close = coord.close_token();

        // Ignores shutdown, only finishes when asked to close.
        let _ = tracker.spawn(async move {
            close.cancelled().await;
        });

        let outcome = coord.drain(&tracker, Some(Duration::from_millis(50))).await;
        assert_eq!(outcome, DrainOutcome::ClosedAfterTimeout);
        assert!(tracker.is_empty());
    }
}
