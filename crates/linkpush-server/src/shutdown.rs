//! Shutdown: one token for every long-lived task, one tracker to drain them.
//!
//! The HTTP serve loop, the session sweeper and each WebSocket session run
//! as tracked tasks. [`ShutdownCoordinator::drain`] cancels the token and
//! waits for all of them, so a session gets to send its Close frame and
//! unbind before the process exits.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::drain`] waits by default.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Cancellation plus task tracking for the server's long-lived tasks.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator with nothing tracked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a task that shutdown waits for.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task)
    }

    /// Wrap a future run elsewhere (such as a WebSocket upgrade callback) so
    /// shutdown waits for it.
    pub fn track<F: Future>(&self, task: F) -> TrackedFuture<F> {
        self.tasks.track_future(task)
    }

    /// Tracked tasks still running.
    pub fn active_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel the token. Tasks see it at their next select point.
    pub fn shutdown(&self) {
        self.token.cancel();
        let _ = self.tasks.close();
    }

    /// Cancel, then wait up to `timeout` for every tracked task.
    ///
    /// Returns `false` if some tasks were still running at the deadline.
    pub async fn drain(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        info!(
            task_count = self.tasks.len(),
            timeout_secs = timeout.as_secs(),
            "draining server tasks"
        );

        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            warn!(
                remaining = self.tasks.len(),
                "drain timed out after {timeout:?}"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_waits_for_spawned_and_tracked_tasks() {
        let coord = ShutdownCoordinator::new();

        let token = coord.token();
        let _ = coord.spawn(async move { token.cancelled().await });

        let token = coord.token();
        let tracked = coord.track(async move { token.cancelled().await });
        drop(tokio::spawn(tracked));

        assert_eq!(coord.active_tasks(), 2);
        assert!(coord.drain(None).await);
        assert_eq!(coord.active_tasks(), 0);
        assert!(coord.token().is_cancelled());
    }

    #[tokio::test]
    async fn drain_with_nothing_tracked_returns_immediately() {
        let coord = ShutdownCoordinator::new();
        assert!(coord.drain(Some(Duration::from_millis(10))).await);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_on_stuck_task() {
        let coord = ShutdownCoordinator::new();

        // Ignores cancellation.
        let _ = coord.spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        assert!(!coord.drain(Some(Duration::from_millis(100))).await);
        assert_eq!(coord.active_tasks(), 1);
    }

    #[test]
    fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }
}
