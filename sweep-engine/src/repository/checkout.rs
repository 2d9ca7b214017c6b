//! Repository checkouts
//!
//! Materializes a target at its revision into a directory owned by the task.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use sweep_core::RepoTarget;

/// Fetches a repository checkout
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// Populates `dest` with the contents of `repo` at `repo.revision`
    ///
    /// # Arguments
    /// * `repo` - The target to materialize
    /// * `dest` - Existing, empty directory private to the calling task
    async fn checkout(&self, repo: &RepoTarget, dest: &Path) -> Result<()>;
}

/// [`CheckoutProvider`] that clones with the `git` CLI
///
/// Sources are looked up by repository id; unknown ids fail the task.
#[derive(Debug, Clone, Default)]
pub struct GitCheckout {
    sources: HashMap<String, String>,
}

impl GitCheckout {
    /// Creates a checkout provider
    ///
    /// # Arguments
    /// * `sources` - Repository id to clone URL (or local path)
    pub fn new(sources: HashMap<String, String>) -> Self {
        Self { sources }
    }

    async fn git(args: &[&str]) -> Result<()> {
        debug!("git {}", args.join(" "));

        let output = Command::new("git")
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute git. Is git installed?")?;

        if !output.status.success() {
            anyhow::bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}

#[async_trait]
impl CheckoutProvider for GitCheckout {
    async fn checkout(&self, repo: &RepoTarget, dest: &Path) -> Result<()> {
        let source = self
            .sources
            .get(repo.identity())
            .with_context(|| format!("No source known for repository {}", repo.name))?;
        let dest_arg = dest.to_string_lossy();

        Self::git(&["clone", "--quiet", "--no-checkout", source, &dest_arg])
            .await
            .with_context(|| format!("Failed to clone {}", source))?;
        Self::git(&["-C", &dest_arg, "checkout", "--quiet", &repo.revision, "--"])
            .await
            .with_context(|| format!("Failed to check out revision {}", repo.revision))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_repository_fails() {
        let dest = tempfile::tempdir().unwrap();
        let provider = GitCheckout::new(HashMap::new());
        let err = provider
            .checkout(&RepoTarget::new("R1", "org/a", "main"), dest.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No source known"));
    }
}
