//! Terminal progress reporter
//!
//! Renders engine status snapshots on stderr:
//! - one permanent line per task as it finishes
//! - on a terminal, a live tally bar plus one spinner per running task
//!
//! When stderr is not a terminal only the permanent lines are printed.

use colored::*;
use console::Term;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use sweep_core::{RepoTarget, TaskState, TaskStatus};
use sweep_engine::{ProgressReporter, StatusSnapshot, Tally};

/// Maximum number of running tasks given a spinner
const MAX_LIVE_ROWS: usize = 10;

const TALLY_TEMPLATE: &str = "{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "  {spinner:.cyan} {prefix} {wide_msg:.dim}";

#[derive(Default)]
struct RenderState {
    /// Identities of tasks already printed as finished
    reported: HashSet<String>,
    /// Spinners of running tasks, by identity
    running: HashMap<String, ProgressBar>,
}

pub struct TerminalProgress {
    multi: MultiProgress,
    tally: ProgressBar,
    live: bool,
    state: Mutex<RenderState>,
}

impl TerminalProgress {
    /// Reporter drawing to stderr, with live bars only if it is a terminal
    pub fn stderr() -> Self {
        Self::new(
            MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            Term::stderr().is_term(),
        )
    }

    /// Creates a reporter drawing through `multi`
    ///
    /// # Arguments
    /// * `multi` - Bar container the tally and spinners are added to
    /// * `live` - Whether permanent lines go above the bars or straight to stderr
    pub fn new(multi: MultiProgress, live: bool) -> Self {
        let tally = multi.add(ProgressBar::new(0));
        tally.set_style(style(TALLY_TEMPLATE));
        tally.set_prefix("Progress");

        Self {
            multi,
            tally,
            live,
            state: Mutex::new(RenderState::default()),
        }
    }

    /// Removes every bar so that following output starts on a clean line
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        for (_, bar) in state.running.drain() {
            bar.finish_and_clear();
        }
        self.tally.finish_and_clear();
        let _ = self.multi.clear();
    }

    /// Applies `snapshot`, returning the permanent lines of newly finished tasks
    fn render(&self, snapshot: &StatusSnapshot, state: &mut RenderState) -> Vec<String> {
        let mut entries: Vec<(&RepoTarget, &TaskStatus)> = snapshot.iter().collect();
        entries.sort_by(|a, b| a.0.name.cmp(&b.0.name));

        let mut lines = Vec::new();
        for (repo, status) in &entries {
            let identity = repo.identity();
            if status.is_terminal() {
                if let Some(bar) = state.running.remove(identity) {
                    bar.finish_and_clear();
                    self.multi.remove(&bar);
                }
                if state.reported.insert(identity.to_string()) {
                    lines.push(finished_line(repo, status));
                }
            } else if status.is_running() {
                if let Some(bar) = state.running.get(identity) {
                    bar.set_message(current_step(status));
                } else if state.running.len() < MAX_LIVE_ROWS {
                    let bar = self.multi.add(ProgressBar::new_spinner());
                    bar.set_style(style(SPINNER_TEMPLATE));
                    bar.set_prefix(repo.name.clone());
                    bar.set_message(current_step(status));
                    bar.enable_steady_tick(Duration::from_millis(100));
                    state.running.insert(identity.to_string(), bar);
                }
            }
        }

        let tally = Tally::of(snapshot);
        self.tally.set_length(tally.total() as u64);
        self.tally.set_position(tally.finished() as u64);
        self.tally.set_message(format!(
            "{} running, {} failed, {} cached",
            tally.running, tally.failed, tally.cached
        ));

        lines
    }

    fn emit(&self, line: &str) {
        if self.live {
            let _ = self.multi.println(line);
        } else {
            eprintln!("{}", line);
        }
    }
}

impl ProgressReporter for TerminalProgress {
    fn on_update(&self, snapshot: &StatusSnapshot) {
        let mut state = self.state.lock().unwrap();
        for line in self.render(snapshot, &mut state) {
            self.emit(&line);
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn current_step(status: &TaskStatus) -> String {
    if status.currently_executing.is_empty() {
        "starting".to_string()
    } else {
        status.currently_executing.clone()
    }
}

fn finished_line(repo: &RepoTarget, status: &TaskStatus) -> String {
    let elapsed = status
        .execution_time()
        .map(|d| format!(" ({:.1}s)", d.num_milliseconds() as f64 / 1000.0))
        .unwrap_or_default();

    match status.state() {
        TaskState::Failed => {
            let error = status
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            let log = status
                .log_location
                .as_ref()
                .map(|path| format!(" (log: {})", path.display()))
                .unwrap_or_default();
            format!("{} {} {}{}", "✗".red(), repo.name, error.red(), log)
        }
        _ => {
            let cached = if status.cached { " [cached]" } else { "" };
            match &status.patch {
                Some(patch) => {
                    let stat = patch.stat();
                    let (plus, minus) = stat.diagram(30);
                    format!(
                        "{} {} {} {}{}{}{}",
                        "✓".green(),
                        repo.name,
                        stat.description(),
                        plus.green(),
                        minus.red(),
                        cached.dimmed(),
                        elapsed.dimmed()
                    )
                }
                None => format!(
                    "{} {} {}{}{}",
                    "✓".green(),
                    repo.name,
                    "no changes".dimmed(),
                    cached.dimmed(),
                    elapsed.dimmed()
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sweep_core::{Patch, TaskError};

    fn hidden() -> TerminalProgress {
        TerminalProgress::new(
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            false,
        )
    }

    fn running(step: &str) -> TaskStatus {
        let mut status = TaskStatus::enqueued();
        status.started_at = Some(Utc::now());
        status.currently_executing = step.to_string();
        status
    }

    fn finished(error: Option<TaskError>, patch: Option<Patch>) -> TaskStatus {
        let mut status = running("");
        status.finished_at = Some(Utc::now());
        status.error = error;
        status.patch = patch;
        status
    }

    #[test]
    fn test_finished_tasks_reported_once() {
        colored::control::set_override(false);
        let progress = hidden();
        let mut snapshot = StatusSnapshot::new();
        snapshot.insert(
            RepoTarget::new("1", "org/a", "main"),
            finished(
                None,
                Some(Patch {
                    repository: "1".to_string(),
                    base_revision: "main".to_string(),
                    diff: "diff --git a a\n@@ -1 +1 @@\n-x\n+y\n".to_string(),
                }),
            ),
        );
        snapshot.insert(
            RepoTarget::new("2", "org/b", "main"),
            finished(Some(TaskError::Cancelled), None),
        );

        let mut state = RenderState::default();
        let first = progress.render(&snapshot, &mut state);
        assert_eq!(first.len(), 2);
        assert!(first[0].starts_with("✓ org/a 1 file changed +-"));
        assert!(first[1].starts_with("✗ org/b cancelled"));

        assert!(progress.render(&snapshot, &mut state).is_empty());
    }

    #[test]
    fn test_running_tasks_get_a_spinner_until_finished() {
        let progress = hidden();
        let repo = RepoTarget::new("1", "org/a", "main");
        let mut snapshot = StatusSnapshot::new();
        snapshot.insert(repo.clone(), running("sh -c gofmt"));
        snapshot.insert(RepoTarget::new("2", "org/b", "main"), TaskStatus::enqueued());

        let mut state = RenderState::default();
        progress.render(&snapshot, &mut state);
        assert_eq!(state.running.len(), 1);
        assert_eq!(state.running["1"].prefix(), "org/a");
        assert_eq!(state.running["1"].message(), "sh -c gofmt");
        assert_eq!(progress.tally.length(), Some(2));
        assert_eq!(progress.tally.position(), 0);
        assert!(progress.tally.message().starts_with("1 running"));

        snapshot.insert(repo, finished(None, None));
        let lines = progress.render(&snapshot, &mut state);
        assert_eq!(lines.len(), 1);
        assert!(state.running.is_empty());
        assert_eq!(progress.tally.position(), 1);
    }

    #[test]
    fn test_spinners_are_capped() {
        let progress = hidden();
        let snapshot: StatusSnapshot = (0..MAX_LIVE_ROWS + 5)
            .map(|i| {
                (
                    RepoTarget::new(i.to_string(), format!("org/{:02}", i), "main"),
                    running("step"),
                )
            })
            .collect();

        let mut state = RenderState::default();
        progress.render(&snapshot, &mut state);
        assert_eq!(state.running.len(), MAX_LIVE_ROWS);
        assert!(progress.tally.message().starts_with("15 running"));
    }
}
