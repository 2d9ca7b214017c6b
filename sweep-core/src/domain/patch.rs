//! Patch domain types

use serde::{Deserialize, Serialize};

/// The unified diff produced by a successful task
///
/// Only produced for non-empty diffs. `repository` carries the repository
/// id, which is what downstream change-management tooling addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub repository: String,
    pub base_revision: String,
    pub diff: String,
}

impl Patch {
    pub fn stat(&self) -> DiffStat {
        DiffStat::from_diff(&self.diff)
    }
}

/// Summary counts for a unified diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStat {
    pub files: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffStat {
    /// Counts files, added and removed lines in a git-style unified diff
    pub fn from_diff(diff: &str) -> Self {
        let mut stat = DiffStat::default();
        let mut in_hunk = false;

        for line in diff.lines() {
            if line.starts_with("diff --git ") {
                stat.files += 1;
                in_hunk = false;
            } else if line.starts_with("@@") {
                in_hunk = true;
            } else if in_hunk && line.starts_with('+') {
                stat.insertions += 1;
            } else if in_hunk && line.starts_with('-') {
                stat.deletions += 1;
            }
        }

        stat
    }

    /// `3 files changed` / `1 file changed`
    pub fn description(&self) -> String {
        let plural = if self.files == 1 { "" } else { "s" };
        format!("{} file{} changed", self.files, plural)
    }

    /// `+++++---` bar, scaled down to at most `max_width` characters
    pub fn diagram(&self, max_width: usize) -> (String, String) {
        let mut added = self.insertions as f64;
        let mut deleted = self.deletions as f64;
        let total = added + deleted;
        if total > max_width as f64 {
            let scale = max_width as f64 / total;
            added *= scale;
            deleted *= scale;
        }
        (
            "+".repeat(added as usize),
            "-".repeat(deleted as usize),
        )
    }
}
