//! Execution context for a single task
//!
//! Bundles everything a task needs while it runs:
//! - the target repository and its private checkout directory
//! - the task's log file
//! - the handle used to publish live status
//! - the deadline and cancellation token bounding the task

use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use sweep_core::RepoTarget;

use crate::scheduler::{CancelToken, TaskHandle};
use crate::service::TaskLog;

/// Longest wall-clock budget honoured for a task; longer timeouts are clamped
pub const MAX_TASK_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

pub struct TaskContext {
    pub repo: RepoTarget,

    /// Private working directory holding the checkout
    pub checkout: PathBuf,

    pub log: TaskLog,

    pub status: TaskHandle,

    pub stop: CancelToken,

    /// Instant at which the task times out
    pub deadline: Instant,

    /// The timeout the deadline was derived from, for error reporting
    pub timeout: Duration,
}

impl TaskContext {
    /// Creates a new task context whose clock starts now
    ///
    /// # Arguments
    /// * `repo` - The task's repository target
    /// * `checkout` - Directory the repository is materialized into
    /// * `log` - The task's log
    /// * `status` - Status handle of this task
    /// * `stop` - Run-wide cancellation token
    /// * `timeout` - Wall-clock budget of the task
    pub fn new(
        repo: RepoTarget,
        checkout: PathBuf,
        log: TaskLog,
        status: TaskHandle,
        stop: CancelToken,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            checkout,
            log,
            status,
            stop,
            deadline: deadline_after(Instant::now(), timeout),
            timeout,
        }
    }
}

/// Deadline `timeout` after `start`, clamped so it never overflows
fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start + timeout.min(MAX_TASK_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_is_timeout_after_start() {
        let start = Instant::now();
        assert_eq!(
            deadline_after(start, Duration::from_secs(5)),
            start + Duration::from_secs(5)
        );
    }

    #[test]
    fn test_huge_timeout_is_clamped() {
        let start = Instant::now();
        let deadline = deadline_after(start, Duration::from_secs(u64::MAX));
        assert_eq!(deadline, start + MAX_TASK_TIMEOUT);

        let deadline = deadline_after(start, Duration::MAX);
        assert_eq!(deadline, start + MAX_TASK_TIMEOUT);
    }
}
