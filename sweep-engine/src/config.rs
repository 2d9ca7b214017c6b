//! Engine configuration
//!
//! Defines every tunable of a run:
//! - worker pool size and per-task timeout
//! - result cache location and invalidation
//! - where checkouts and logs live
//! - how often progress reporters are notified
//! - which container runtime binary to invoke

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
///
/// Immutable once handed to a coordinator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of tasks running at once
    pub parallelism: usize,

    /// Wall-clock limit for a whole task, checkout to diff
    pub task_timeout: Duration,

    /// Result cache directory, `None` disables caching
    pub cache_dir: Option<PathBuf>,

    /// Ignore existing cache entries (new results are still written)
    pub clear_cache: bool,

    /// Keep log files and checkouts of successful tasks
    pub keep_logs: bool,

    /// Parent directory for per-task checkouts and logs
    pub work_dir: PathBuf,

    /// Minimum delay between two progress reports
    pub update_interval: Duration,

    /// Container runtime binary (`docker` or a compatible CLI such as `podman`)
    pub container_program: String,
}

impl EngineConfig {
    /// Creates a new configuration with defaults
    ///
    /// # Arguments
    /// * `work_dir` - Parent directory for per-task scratch space
    pub fn new(work_dir: PathBuf) -> Self {
        Self {
            parallelism: default_parallelism(),
            task_timeout: Duration::from_secs(60 * 60),
            cache_dir: None,
            clear_cache: false,
            keep_logs: false,
            work_dir,
            update_interval: Duration::from_millis(100),
            container_program: "docker".to_string(),
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Enables the on-disk result cache under `dir`
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    pub fn with_clear_cache(mut self, clear: bool) -> Self {
        self.clear_cache = clear;
        self
    }

    pub fn with_keep_logs(mut self, keep: bool) -> Self {
        self.keep_logs = keep;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_container_program(mut self, program: impl Into<String>) -> Self {
        self.container_program = program.into();
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.parallelism == 0 {
            anyhow::bail!("parallelism must be greater than 0");
        }

        if self.task_timeout.is_zero() {
            anyhow::bail!("task_timeout must be greater than 0");
        }

        if self.update_interval.is_zero() {
            anyhow::bail!("update_interval must be greater than 0");
        }

        if self.container_program.trim().is_empty() {
            anyhow::bail!("container_program cannot be empty");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

/// Number of logical CPUs, or 1 if it cannot be determined
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
