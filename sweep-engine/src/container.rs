//! Container runtime adapter
//!
//! Drives a docker-compatible CLI for the four operations the engine needs:
//! - building an image from an inline recipe
//! - inspecting an image for its local content fingerprint
//! - preparing a `run` invocation for a container step
//! - killing a running step container on timeout or cancellation
//!
//! The runtime sits behind [`ContainerRuntime`] so tests can substitute it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::RuntimeError;

/// Mount point of the checkout inside step containers
pub const CONTAINER_WORKDIR: &str = "/work";

/// Everything needed to launch one container step
#[derive(Debug, Clone)]
pub struct ContainerRun {
    /// Unique container name, used to kill it
    pub name: String,
    pub image: String,
    /// Host checkout, mounted at [`CONTAINER_WORKDIR`]
    pub checkout: PathBuf,
    /// `(host directory, container path)` pairs
    pub cache_mounts: Vec<(PathBuf, String)>,
    pub args: Vec<String>,
}

impl ContainerRun {
    /// Generates a container name that is unique across concurrent tasks
    pub fn unique_name() -> String {
        format!("sweep-{}", Uuid::new_v4().simple())
    }
}

/// Container runtime collaborator
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Builds an image from recipe text and returns its local image id
    async fn build(&self, recipe: &str) -> Result<String, RuntimeError>;

    /// Returns the local content identifier of an image.
    ///
    /// Stable across re-tagging, distinct from any registry digest.
    async fn content_fingerprint(&self, image: &str) -> Result<String, RuntimeError>;

    /// Prepares (but does not spawn) the process that runs a container step
    fn run_command(&self, run: &ContainerRun) -> Command;

    /// Kills a running container by name
    async fn kill(&self, name: &str) -> Result<(), RuntimeError>;
}

/// [`ContainerRuntime`] backed by the `docker` (or `podman`) CLI
#[derive(Debug, Clone)]
pub struct CliRuntime {
    program: String,
    scratch_dir: PathBuf,
}

impl CliRuntime {
    /// Creates a new CLI runtime
    ///
    /// # Arguments
    /// * `program` - Runtime binary, e.g. `docker` or `podman`
    /// * `scratch_dir` - Where temporary image-id files are written
    pub fn new(program: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Checks that the runtime binary is installed and answers `--version`
    pub async fn check_available(&self) -> Result<String, RuntimeError> {
        let output = self.output(&["--version"]).await?;
        let version = output.trim().to_string();
        info!("Container runtime is available: {}", version);
        Ok(version)
    }

    /// Runs the program with `args` and returns stdout, failing on non-zero exit
    async fn output(&self, args: &[&str]) -> Result<String, RuntimeError> {
        debug!("Running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(self.command_failed(args, &output.stdout, &output.stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_error(&self, err: std::io::Error) -> RuntimeError {
        RuntimeError::Spawn {
            program: self.program.clone(),
            message: err.to_string(),
        }
    }

    fn command_failed(&self, args: &[&str], stdout: &[u8], stderr: &[u8]) -> RuntimeError {
        let stdout = String::from_utf8_lossy(stdout);
        let stderr = String::from_utf8_lossy(stderr);
        RuntimeError::CommandFailed {
            command: format!("{} {}", self.program, args.join(" ")),
            output: format!("{}{}", stdout.trim(), stderr.trim()),
        }
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn build(&self, recipe: &str) -> Result<String, RuntimeError> {
        let iid_file = self
            .scratch_dir
            .join(format!("sweep-image-{}.iid", Uuid::new_v4().simple()));
        let iid_arg = iid_file.to_string_lossy().into_owned();
        let args = ["build", "--iidfile", iid_arg.as_str(), "-"];

        info!("Building image from inline recipe");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(recipe.as_bytes())
                .await
                .map_err(|e| self.spawn_error(e))?;
            // Dropping stdin closes it so the build can start
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let result = if output.status.success() {
            tokio::fs::read_to_string(&iid_file)
                .await
                .map(|id| id.trim().to_string())
                .map_err(|e| RuntimeError::CommandFailed {
                    command: format!("{} {}", self.program, args.join(" ")),
                    output: format!("reading image id file: {}", e),
                })
        } else {
            Err(self.command_failed(&args, &output.stdout, &output.stderr))
        };

        let _ = tokio::fs::remove_file(&iid_file).await;

        let image = result?;
        info!("Built image {}", image);
        Ok(image)
    }

    async fn content_fingerprint(&self, image: &str) -> Result<String, RuntimeError> {
        let output = self
            .output(&["image", "inspect", "--format", "{{.Id}}", "--", image])
            .await?;

        let fingerprint = output.trim().to_string();
        if fingerprint.is_empty() {
            return Err(RuntimeError::EmptyFingerprint(image.to_string()));
        }

        debug!("Image {} has content fingerprint {}", image, fingerprint);
        Ok(fingerprint)
    }

    fn run_command(&self, run: &ContainerRun) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("run")
            .arg("--rm")
            .arg("--name")
            .arg(&run.name)
            .arg("--workdir")
            .arg(CONTAINER_WORKDIR)
            .arg("--mount")
            .arg(bind_mount(&run.checkout, CONTAINER_WORKDIR));

        for (host, target) in &run.cache_mounts {
            command.arg("--mount").arg(bind_mount(host, target));
        }

        command.arg("--").arg(&run.image).args(&run.args);
        command
    }

    async fn kill(&self, name: &str) -> Result<(), RuntimeError> {
        info!("Killing container {}", name);
        self.output(&["kill", name]).await.map(|_| ())
    }
}

fn bind_mount(source: &Path, target: &str) -> String {
    format!("type=bind,source={},target={}", source.display(), target)
}
