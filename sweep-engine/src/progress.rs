//! Progress reporting interface
//!
//! The engine pushes deep-copied status snapshots to a [`ProgressReporter`]
//! once per enqueue and then at most once per update interval while tasks
//! run, plus one final snapshot when the run ends. Successive snapshots may
//! coalesce several transitions. Rendering is up to the implementation.

use std::collections::HashMap;

use sweep_core::{RepoTarget, TaskState, TaskStatus};

/// Point-in-time copy of every task's status
pub type StatusSnapshot = HashMap<RepoTarget, TaskStatus>;

/// Consumer of status snapshots
pub trait ProgressReporter: Send + Sync {
    /// Called with a snapshot the reporter may keep but never shares with the engine
    fn on_update(&self, snapshot: &StatusSnapshot);
}

/// Counts of tasks per state in a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub enqueued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cached: usize,
}

impl Tally {
    pub fn of(snapshot: &StatusSnapshot) -> Self {
        let mut tally = Tally::default();
        for status in snapshot.values() {
            match status.state() {
                TaskState::Enqueued => tally.enqueued += 1,
                TaskState::Running => tally.running += 1,
                TaskState::Succeeded => tally.succeeded += 1,
                TaskState::Failed => tally.failed += 1,
            }
            if status.cached {
                tally.cached += 1;
            }
        }
        tally
    }

    pub fn total(&self) -> usize {
        self.enqueued + self.running + self.succeeded + self.failed
    }

    pub fn finished(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sweep_core::TaskError;

    #[test]
    fn test_tally_counts_states() {
        let mut snapshot = StatusSnapshot::new();

        snapshot.insert(RepoTarget::new("1", "a", "main"), TaskStatus::enqueued());

        let mut running = TaskStatus::enqueued();
        running.started_at = Some(Utc::now());
        snapshot.insert(RepoTarget::new("2", "b", "main"), running.clone());

        let mut cached = running.clone();
        cached.finished_at = Some(Utc::now());
        cached.cached = true;
        snapshot.insert(RepoTarget::new("3", "c", "main"), cached);

        let mut failed = running;
        failed.finished_at = Some(Utc::now());
        failed.error = Some(TaskError::Cancelled);
        snapshot.insert(RepoTarget::new("4", "d", "main"), failed);

        let tally = Tally::of(&snapshot);
        assert_eq!(
            tally,
            Tally {
                enqueued: 1,
                running: 1,
                succeeded: 1,
                failed: 1,
                cached: 1,
            }
        );
        assert_eq!(tally.total(), 4);
        assert_eq!(tally.finished(), 2);
    }
}
