//! Git-backed workspace diffing
//!
//! A checkout's pristine state is its `HEAD` commit. Checkouts that arrive
//! without git metadata get a baseline commit recorded before any step runs.
//! After the steps, everything is staged and the staged diff is the patch.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use sweep_core::TaskError;

const AUTHOR_NAME: &str = "sweep";
const AUTHOR_EMAIL: &str = "sweep@localhost";

/// Records a baseline commit unless `checkout` is already a git repository
pub async fn prepare_baseline(checkout: &Path) -> Result<(), TaskError> {
    if checkout.join(".git").exists() {
        debug!("{} already has git metadata", checkout.display());
        return Ok(());
    }

    git(checkout, &["init", "-q"]).await?;
    // --force: files matched by a .gitignore are part of the pristine state too
    git(checkout, &["add", "--force", "--all"]).await?;
    git(
        checkout,
        &["commit", "-q", "--allow-empty", "--no-verify", "-m", "sweep baseline"],
    )
    .await?;
    Ok(())
}

/// Returns the diff between the pristine state and the current working tree
///
/// Empty string means the steps left the tree untouched.
pub async fn diff(checkout: &Path) -> Result<String, TaskError> {
    git(checkout, &["add", "--all"]).await?;
    git(checkout, &["diff", "--cached", "--no-prefix", "--binary"]).await
}

async fn git(dir: &Path, args: &[&str]) -> Result<String, TaskError> {
    debug!("git {} in {}", args.join(" "), dir.display());

    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_AUTHOR_NAME", AUTHOR_NAME)
        .env("GIT_AUTHOR_EMAIL", AUTHOR_EMAIL)
        .env("GIT_COMMITTER_NAME", AUTHOR_NAME)
        .env("GIT_COMMITTER_EMAIL", AUTHOR_EMAIL)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| TaskError::Workspace(format!("running git {}: {}", args.join(" "), e)))?;

    if !output.status.success() {
        return Err(TaskError::Workspace(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_untouched_tree_has_empty_diff() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.go"), "package main\n").unwrap();

        prepare_baseline(dir.path()).await.unwrap();
        assert_eq!(diff(dir.path()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_new_and_modified_files_show_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.go"), "package  main\n").unwrap();
        prepare_baseline(dir.path()).await.unwrap();

        std::fs::write(dir.path().join("main.go"), "package main\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# README\n").unwrap();

        let diff = diff(dir.path()).await.unwrap();
        assert!(diff.contains("diff --git README.md README.md"));
        assert!(diff.contains("+# README"));
        assert!(diff.contains("-package  main"));
        assert!(diff.contains("+package main"));
    }

    #[tokio::test]
    async fn test_baseline_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        prepare_baseline(dir.path()).await.unwrap();
        prepare_baseline(dir.path()).await.unwrap();
        assert_eq!(diff(dir.path()).await.unwrap(), "");
    }
}
