//! Best-effort bookkeeping writes (last-used timestamps, usage counters).
//!
//! These run detached from the request that triggered them, bounded by a
//! timeout. Failures are logged and dropped; they never reach the caller.

use std::future::Future;
use std::time::Duration;

use idforge_db::DbResult;
use tokio_util::task::TaskTracker;

/// Default upper bound for one detached update.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Spawns and tracks detached repository updates.
#[derive(Debug, Clone)]
pub struct UsageTracker {
    tasks: TaskTracker,
    timeout: Duration,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_TIMEOUT)
    }
}

impl UsageTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tasks: TaskTracker::new(),
            timeout,
        }
    }

    /// Run `update` in the background. Must be called from within a Tokio runtime.
    pub fn spawn<F>(&self, operation: &'static str, update: F)
    where
        F: Future<Output = DbResult<bool>> + Send + 'static,
    {
        let timeout = self.timeout;
        self.tasks.spawn(async move {
            match tokio::time::timeout(timeout, update).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    tracing::debug!(operation, "Usage update matched no row");
                }
                Ok(Err(e)) => {
                    tracing::warn!(operation, error = %e, "Usage update failed");
                }
                Err(_) => {
                    tracing::warn!(
                        operation,
                        timeout_ms = timeout.as_millis() as u64,
                        "Usage update timed out",
                    );
                }
            }
        });
    }

    /// Number of updates still in flight.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every update spawned so far has finished.
    pub async fn flush(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}
