//! Task status map
//!
//! The single place task statuses live. Every mutation happens under one
//! mutex held only for the mutation itself, and flags the map as dirty so
//! the reporting loop knows a new snapshot is worth sending.

use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use sweep_core::{Patch, RepoTarget, TaskError, TaskStatus};

use crate::error::{EngineError, TaskFailure};
use crate::progress::StatusSnapshot;

#[derive(Default)]
struct HubState {
    tasks: HashMap<String, (RepoTarget, TaskStatus)>,
    dirty: bool,
}

/// Engine-owned map from repository identity to task status
#[derive(Default)]
pub struct StatusHub {
    state: Mutex<HubState>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly enqueued task
    ///
    /// # Errors
    /// [`EngineError::DuplicateRepo`] if the identity is already registered
    pub fn insert(&self, repo: RepoTarget) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let identity = repo.identity().to_string();
        if state.tasks.contains_key(&identity) {
            return Err(EngineError::DuplicateRepo(identity));
        }
        state.tasks.insert(identity, (repo, TaskStatus::enqueued()));
        state.dirty = true;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies `f` to one task's status
    fn update(&self, identity: &str, f: impl FnOnce(&mut TaskStatus)) {
        let mut state = self.state.lock().unwrap();
        if let Some((_, status)) = state.tasks.get_mut(identity) {
            f(status);
            state.dirty = true;
        }
    }

    pub fn mark_started(&self, identity: &str) {
        self.update(identity, |status| status.started_at = Some(Utc::now()));
    }

    /// Moves a task to its terminal state
    pub fn mark_finished(&self, identity: &str, outcome: Result<TaskResult, TaskError>) {
        self.update(identity, |status| {
            status.currently_executing.clear();
            match outcome {
                Ok(result) => {
                    status.cached = result.cached;
                    status.patch = result.patch;
                    status.log_location = result.log_location;
                }
                Err(error) => status.error = Some(error),
            }
            status.finished_at = Some(Utc::now());
        });
    }

    /// Handle through which a running task publishes its progress
    pub fn handle(self: &Arc<Self>, identity: &str) -> TaskHandle {
        TaskHandle {
            hub: Arc::clone(self),
            identity: identity.to_string(),
        }
    }

    /// Deep copy of every status
    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.state.lock().unwrap();
        state
            .tasks
            .values()
            .map(|(repo, status)| (repo.clone(), status.clone()))
            .collect()
    }

    /// Returns whether anything changed since the last call, and resets the flag
    pub fn take_dirty(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.dirty)
    }

    /// Failed tasks, sorted by repository name
    pub fn failures(&self) -> Vec<TaskFailure> {
        let state = self.state.lock().unwrap();
        let mut failures: Vec<TaskFailure> = state
            .tasks
            .values()
            .filter_map(|(repo, status)| {
                status.error.as_ref().map(|error| TaskFailure {
                    repository: repo.name.clone(),
                    log_location: status.log_location.clone(),
                    error: error.clone(),
                })
            })
            .collect();
        failures.sort_by(|a, b| a.repository.cmp(&b.repository));
        failures
    }

    /// Patches of successful tasks, sorted by repository name
    pub fn patches(&self) -> Vec<Patch> {
        let state = self.state.lock().unwrap();
        let mut patches: Vec<(&str, &str, Patch)> = state
            .tasks
            .values()
            .filter_map(|(repo, status)| {
                status
                    .patch
                    .clone()
                    .map(|patch| (repo.name.as_str(), repo.identity(), patch))
            })
            .collect();
        patches.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        patches.into_iter().map(|(_, _, patch)| patch).collect()
    }

    /// Names of tasks that have not reached a terminal state, sorted
    pub fn unfinished(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .tasks
            .values()
            .filter(|(_, status)| !status.is_terminal())
            .map(|(repo, _)| repo.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Returns true if every task reached a terminal state
    pub fn all_terminal(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.tasks.values().all(|(_, status)| status.is_terminal())
    }
}

/// What a successful task hands back to the status map
#[derive(Debug, Clone, Default)]
pub struct TaskResult {
    pub cached: bool,
    pub patch: Option<Patch>,
    /// Retained log, `None` once it has been cleaned up
    pub log_location: Option<PathBuf>,
}

/// Write access to one task's live status fields
#[derive(Clone)]
pub struct TaskHandle {
    hub: Arc<StatusHub>,
    identity: String,
}

impl TaskHandle {
    /// Publishes the step currently in flight
    pub fn set_executing(&self, description: &str) {
        self.hub.update(&self.identity, |status| {
            status.currently_executing = description.to_string();
        });
    }

    pub fn set_log_location(&self, path: PathBuf) {
        self.hub
            .update(&self.identity, |status| status.log_location = Some(path));
    }
}
