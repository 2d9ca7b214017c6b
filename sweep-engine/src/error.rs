//! Error types for the engine
//!
//! Three tiers, matching how far a failure reaches:
//! - [`TaskError`] (from `sweep-core`): one task fails, siblings continue
//! - [`EngineError`]: misuse of the coordinator or a spec-level setup failure
//! - [`RunError`]: the aggregate returned by `Coordinator::wait`

use std::path::PathBuf;
use thiserror::Error;

use sweep_core::TaskError;

/// Errors from the container runtime CLI
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The runtime binary could not be executed at all
    #[error("failed to execute '{program}': {message}")]
    Spawn { program: String, message: String },

    /// The runtime ran but reported failure
    #[error("'{command}' failed: {output}")]
    CommandFailed { command: String, output: String },

    /// Inspect succeeded but returned no identifier
    #[error("unexpected empty content fingerprint for image {0:?}")]
    EmptyFingerprint(String),
}

/// Errors from the one-time image build/inspection phase
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error("building image for step {step}: {source}")]
    Build {
        step: usize,
        #[source]
        source: RuntimeError,
    },

    #[error("resolving content fingerprint of {image:?} for step {step} (try pulling the image first): {source}")]
    Fingerprint {
        step: usize,
        image: String,
        #[source]
        source: RuntimeError,
    },
}

/// Errors from the on-disk result cache
///
/// Never fatal: reads degrade to a miss, failed writes are logged.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache entry {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by the coordinator's public operations
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A repository with the same identity is already enqueued for this run
    #[error("repository {0:?} is already enqueued")]
    DuplicateRepo(String),

    /// `enqueue` or `start` called after the run started
    #[error("the run has already been started")]
    AlreadyStarted,

    /// `wait` called with tasks enqueued but no run started
    #[error("the run has not been started")]
    NotStarted,

    /// A worker task panicked or was aborted
    #[error("worker failure: {0}")]
    Worker(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Images could not be built or inspected
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// One failed task, as reported by `wait`
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub repository: String,
    pub log_location: Option<PathBuf>,
    pub error: TaskError,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "execution in {} failed: {}", self.repository, self.error)?;
        if let Some(log) = &self.log_location {
            write!(f, " (see {} for details)", log.display())?;
        }
        Ok(())
    }
}

/// Aggregate outcome of a run that did not fully succeed
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// The shared setup phase failed; no task could run
    #[error("run aborted: {0}")]
    Setup(#[source] EngineError),

    /// The cancellation token fired before every task finished
    #[error("run cancelled{}", summarize(.0))]
    Cancelled(Vec<TaskFailure>),

    /// Every task ran; these ones failed. Sorted by repository name.
    #[error("{} task(s) failed{}", .0.len(), summarize(.0))]
    TasksFailed(Vec<TaskFailure>),

    /// The workers stopped while some tasks were still pending or running
    #[error("{} task(s) never finished: {}{}", .unfinished.len(), .unfinished.join(", "), summarize(.failures))]
    Incomplete {
        unfinished: Vec<String>,
        failures: Vec<TaskFailure>,
    },
}

impl RunError {
    /// Failed tasks carried by this error, empty for setup failures
    pub fn failures(&self) -> &[TaskFailure] {
        match self {
            RunError::Setup(_) => &[],
            RunError::Cancelled(failures)
            | RunError::TasksFailed(failures)
            | RunError::Incomplete { failures, .. } => failures,
        }
    }
}

fn summarize(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("\n  - {}", failure))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_failed_lists_every_failure() {
        let err = RunError::TasksFailed(vec![
            TaskFailure {
                repository: "org/a".to_string(),
                log_location: Some(PathBuf::from("/tmp/a.log")),
                error: TaskError::StepFailed {
                    step: 0,
                    exit_code: Some(1),
                },
            },
            TaskFailure {
                repository: "org/b".to_string(),
                log_location: None,
                error: TaskError::Cancelled,
            },
        ]);

        let message = err.to_string();
        assert!(message.starts_with("2 task(s) failed"));
        assert!(message.contains("execution in org/a failed: step 0 failed with exit code 1 (see /tmp/a.log for details)"));
        assert!(message.contains("execution in org/b failed: cancelled"));
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_incomplete_names_unfinished_tasks() {
        let err = RunError::Incomplete {
            unfinished: vec!["org/a".to_string(), "org/b".to_string()],
            failures: Vec::new(),
        };
        assert_eq!(err.to_string(), "2 task(s) never finished: org/a, org/b");
        assert!(err.failures().is_empty());
    }

    #[test]
    fn test_setup_has_no_task_failures() {
        let err = RunError::Setup(EngineError::AlreadyStarted);
        assert!(err.failures().is_empty());
    }
}
