//! Task status domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::patch::Patch;

/// Lifecycle state of a task, derived from its [`TaskStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Enqueued,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Engine-owned record of one task's progress
///
/// Structure shared between the engine (mutates it under a lock) and progress
/// reporters (receive deep copies). Terminal once `finished_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cached: bool,
    /// Human description of the step in flight, empty when idle
    pub currently_executing: String,
    pub error: Option<TaskError>,
    pub patch: Option<Patch>,
    pub log_location: Option<PathBuf>,
}

impl TaskStatus {
    /// Creates the status of a freshly enqueued task
    pub fn enqueued() -> Self {
        Self {
            enqueued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            cached: false,
            currently_executing: String::new(),
            error: None,
            patch: None,
            log_location: None,
        }
    }

    pub fn state(&self) -> TaskState {
        match (self.started_at, self.finished_at) {
            (_, Some(_)) if self.error.is_some() => TaskState::Failed,
            (_, Some(_)) => TaskState::Succeeded,
            (Some(_), None) => TaskState::Running,
            (None, None) => TaskState::Enqueued,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wall time between start and finish, if both are known
    pub fn execution_time(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some(finished - started),
            _ => None,
        }
    }
}

/// Why a single task failed
///
/// Isolated to the task it belongs to; never aborts sibling tasks.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TaskError {
    #[error("checkout failed: {0}")]
    Checkout(String),

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("step {step} could not be started: {message}")]
    Launch { step: usize, message: String },

    #[error("step {step} failed with {}", exit_label(.exit_code))]
    StepFailed { step: usize, exit_code: Option<i32> },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(String),

    /// The task's execution died without producing an outcome
    #[error("task aborted unexpectedly: {0}")]
    Aborted(String),
}

impl TaskError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::TimedOut(_))
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::Io(err.to_string())
    }
}

fn exit_label(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (killed by signal)".to_string(),
    }
}
