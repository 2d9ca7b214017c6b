//! Step runner
//!
//! Executes a task's resolved steps strictly in order inside its checkout.
//! The first failing step aborts the rest. Timeouts and cancellation are
//! enforced by the caller dropping the future: local processes are killed on
//! drop and step containers are killed by [`ContainerGuard`].

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

use sweep_core::TaskError;

use crate::container::{ContainerRun, ContainerRuntime};
use crate::context::TaskContext;
use crate::images::{ResolvedSpec, ResolvedStep, StepAction};

/// Runs resolved steps, shared by every worker
pub struct StepRunner {
    runtime: Arc<dyn ContainerRuntime>,
    cache_dirs_root: PathBuf,
}

impl StepRunner {
    /// Creates a new step runner
    ///
    /// # Arguments
    /// * `runtime` - Container runtime for container steps
    /// * `cache_dirs_root` - Host directory backing declared cache directories
    pub fn new(runtime: Arc<dyn ContainerRuntime>, cache_dirs_root: PathBuf) -> Self {
        Self {
            runtime,
            cache_dirs_root,
        }
    }

    /// Runs every step of `spec` in the task's checkout
    pub async fn run_all(&self, ctx: &TaskContext, spec: &ResolvedSpec) -> Result<(), TaskError> {
        for (index, step) in spec.steps.iter().enumerate() {
            if ctx.stop.is_cancelled() {
                return Err(TaskError::Cancelled);
            }

            ctx.status.set_executing(&step.description);
            ctx.log.line(format!("# Step {}: {}", index, step.description));

            let started = Instant::now();
            match self.run_step(ctx, index, step).await {
                Ok(()) => {
                    ctx.log
                        .line(format!("# Step {}: done. ({:.2?})", index, started.elapsed()));
                }
                Err(e) => {
                    ctx.log.line(format!("# Step {}: error: {}", index, e));
                    return Err(e);
                }
            }
        }

        ctx.status.set_executing("");
        Ok(())
    }

    async fn run_step(
        &self,
        ctx: &TaskContext,
        index: usize,
        step: &ResolvedStep,
    ) -> Result<(), TaskError> {
        let launch_err = |e: std::io::Error| TaskError::Launch {
            step: index,
            message: e.to_string(),
        };

        let (mut command, guard) = match &step.action {
            StepAction::Command { args } => {
                let (program, rest) = args.split_first().ok_or_else(|| TaskError::Launch {
                    step: index,
                    message: "empty command".to_string(),
                })?;
                let mut command = Command::new(program);
                command.args(rest).current_dir(&ctx.checkout);
                (command, None)
            }
            StepAction::Container {
                image,
                fingerprint,
                args,
            } => {
                let cache_mounts = self
                    .cache_mounts(ctx, fingerprint, &step.cache_dirs)
                    .await
                    .map_err(launch_err)?;
                let run = ContainerRun {
                    name: ContainerRun::unique_name(),
                    image: image.clone(),
                    checkout: ctx.checkout.clone(),
                    cache_mounts,
                    args: args.clone(),
                };
                let command = self.runtime.run_command(&run);
                let guard = ContainerGuard::new(Arc::clone(&self.runtime), run.name);
                (command, Some(guard))
            }
        };

        command
            .stdin(Stdio::null())
            .stdout(ctx.log.stdio().map_err(launch_err)?)
            .stderr(ctx.log.stdio().map_err(launch_err)?)
            .kill_on_drop(true);

        debug!("Step {} of {}: spawning {:?}", index, ctx.repo, command.as_std());
        let mut child = command.spawn().map_err(launch_err)?;
        let status = child.wait().await.map_err(launch_err)?;

        if let Some(guard) = guard {
            guard.disarm();
        }

        if !status.success() {
            return Err(TaskError::StepFailed {
                step: index,
                exit_code: status.code(),
            });
        }

        Ok(())
    }

    /// Host directories backing the declared cache dirs of a container step
    ///
    /// They persist across runs and are scoped to image content and
    /// repository revision.
    async fn cache_mounts(
        &self,
        ctx: &TaskContext,
        fingerprint: &str,
        cache_dirs: &BTreeSet<String>,
    ) -> std::io::Result<Vec<(PathBuf, String)>> {
        if cache_dirs.is_empty() {
            return Ok(Vec::new());
        }

        let scope = self.cache_dirs_root.join(short_digest(&[
            fingerprint,
            ctx.repo.identity(),
            ctx.repo.revision.as_str(),
        ]));

        let mut mounts = Vec::with_capacity(cache_dirs.len());
        for dir in cache_dirs {
            let host = scope.join(short_digest(&[dir.as_str()]));
            tokio::fs::create_dir_all(&host).await?;
            mounts.push((host, dir.clone()));
        }
        Ok(mounts)
    }
}

fn short_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(16);
    digest
}

/// Kills a step container if dropped before the step finished
struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    name: Option<String>,
}

impl ContainerGuard {
    fn new(runtime: Arc<dyn ContainerRuntime>, name: String) -> Self {
        Self {
            runtime,
            name: Some(name),
        }
    }

    fn disarm(mut self) {
        self.name = None;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        let runtime = Arc::clone(&self.runtime);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = runtime.kill(&name).await {
                        warn!("Failed to kill container {}: {}", name, e);
                    }
                });
            }
            Err(_) => warn!("No runtime available to kill container {}", name),
        }
    }
}

/// Path under which cache-dir volumes are kept
pub fn cache_dirs_root(work_dir: &Path) -> PathBuf {
    work_dir.join("sweep-cache-dirs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_digest_separates_parts() {
        assert_ne!(short_digest(&["ab", "c"]), short_digest(&["a", "bc"]));
        assert_eq!(short_digest(&["x"]).len(), 16);
    }

    #[test]
    fn test_cache_dirs_root() {
        assert_eq!(
            cache_dirs_root(Path::new("/tmp")),
            PathBuf::from("/tmp/sweep-cache-dirs")
        );
    }
}
