//! Configuration module
//!
//! Maps command-line flags (with `SWEEP_*` environment fallbacks) onto the
//! engine configuration.

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use sweep_engine::EngineConfig;
use sweep_engine::config::default_parallelism;

/// Engine tunables shared by commands that execute a spec
#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    /// Number of repositories processed in parallel (default: CPU count)
    #[arg(short = 'j', long, env = "SWEEP_PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Result cache directory (default: <temp>/sweep-cache)
    #[arg(long, env = "SWEEP_CACHE_DIR", conflicts_with = "no_cache")]
    pub cache: Option<PathBuf>,

    /// Disable the result cache entirely
    #[arg(long)]
    pub no_cache: bool,

    /// Ignore cached results, refreshing them with new ones
    #[arg(long)]
    pub clear_cache: bool,

    /// Keep logs and checkouts of successful repositories
    #[arg(long, env = "SWEEP_KEEP_LOGS")]
    pub keep_logs: bool,

    /// Per-repository timeout in seconds
    #[arg(long, env = "SWEEP_TIMEOUT_SECS", default_value = "3600")]
    pub timeout_secs: u64,

    /// Container runtime binary (docker or podman)
    #[arg(long, env = "SWEEP_CONTAINER_PROGRAM", default_value = "docker")]
    pub container_program: String,

    /// Directory for checkouts, logs and cache-dir volumes (default: system temp dir)
    #[arg(long, env = "SWEEP_WORK_DIR")]
    pub work_dir: Option<PathBuf>,
}

impl EngineArgs {
    /// Builds and validates the engine configuration
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let work_dir = self.work_dir.clone().unwrap_or_else(std::env::temp_dir);

        let mut config = EngineConfig::new(work_dir)
            .with_parallelism(self.parallelism.unwrap_or_else(default_parallelism))
            .with_task_timeout(Duration::from_secs(self.timeout_secs))
            .with_clear_cache(self.clear_cache)
            .with_keep_logs(self.keep_logs)
            .with_container_program(self.container_program.clone());

        if !self.no_cache {
            let cache_dir = self
                .cache
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("sweep-cache"));
            config = config.with_cache_dir(cache_dir);
        }

        config.validate()?;
        Ok(config)
    }
}
