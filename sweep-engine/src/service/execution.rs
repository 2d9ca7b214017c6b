//! Execution service
//!
//! Runs one task end to end:
//! - materializing the checkout in a private directory
//! - looking the task up in the result cache
//! - recording the pristine baseline and running the steps
//! - diffing the tree and writing the result through to the cache
//!
//! Everything up to the diff is bounded by the task deadline and the run's
//! cancellation token; the cache write happens after that race is decided. Checkouts and logs of successful tasks are removed
//! unless the run keeps logs; those of failed tasks are always retained.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use sweep_core::{DiffStat, Patch, RepoTarget, TaskError};

use crate::cache::{CacheEntry, CacheKey, CachedResult, ExecutionCache};
use crate::config::EngineConfig;
use crate::container::ContainerRuntime;
use crate::context::TaskContext;
use crate::images::ResolvedSpec;
use crate::repository::CheckoutProvider;
use crate::scheduler::{CancelToken, TaskHandle, TaskResult};
use crate::service::steps::{StepRunner, cache_dirs_root};
use crate::service::task_log::LogManager;
use crate::workspace;

/// Service trait for executing a single task
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Executes `spec` against `repo`
    ///
    /// # Arguments
    /// * `repo` - The task's repository target
    /// * `spec` - The run's resolved spec
    /// * `status` - Handle for publishing live status
    /// * `stop` - Run-wide cancellation token
    ///
    /// # Returns
    /// The task's result, or the error that failed it
    async fn execute(
        &self,
        repo: &RepoTarget,
        spec: &ResolvedSpec,
        status: TaskHandle,
        stop: CancelToken,
    ) -> Result<TaskResult, TaskError>;
}

/// What the pipeline produced before cleanup
struct Produced {
    cached: bool,
    diff: Option<String>,
    /// Fresh result to store once the task is no longer racing its deadline
    store: Option<CacheEntry>,
}

/// Standard implementation of ExecutionService
pub struct StandardExecutionService {
    checkout: Arc<dyn CheckoutProvider>,
    cache: Arc<dyn ExecutionCache>,
    steps: StepRunner,
    logs: LogManager,
    work_dir: PathBuf,
    timeout: Duration,
    keep_logs: bool,
}

impl StandardExecutionService {
    /// Creates a new standard execution service
    ///
    /// # Arguments
    /// * `config` - Engine configuration
    /// * `checkout` - Provider materializing repository checkouts
    /// * `runtime` - Container runtime for container steps
    /// * `cache` - Result cache
    pub fn new(
        config: &EngineConfig,
        checkout: Arc<dyn CheckoutProvider>,
        runtime: Arc<dyn ContainerRuntime>,
        cache: Arc<dyn ExecutionCache>,
    ) -> Self {
        Self {
            checkout,
            cache,
            steps: StepRunner::new(runtime, cache_dirs_root(&config.work_dir)),
            logs: LogManager::new(config.work_dir.clone()),
            work_dir: config.work_dir.clone(),
            timeout: config.task_timeout,
            keep_logs: config.keep_logs,
        }
    }

    async fn pipeline(&self, ctx: &TaskContext, spec: &ResolvedSpec) -> Result<Produced, TaskError> {
        tokio::fs::create_dir_all(&ctx.checkout)
            .await
            .map_err(|e| {
                TaskError::Workspace(format!("creating {}: {}", ctx.checkout.display(), e))
            })?;

        ctx.status
            .set_executing(&format!("Fetching {}", ctx.repo.revision));
        self.checkout
            .checkout(&ctx.repo, &ctx.checkout)
            .await
            .map_err(|e| TaskError::Checkout(format!("{:#}", e)))?;

        let key = CacheKey::new(&ctx.repo, spec);
        if let Some(entry) = self.cache.get(&key).await {
            info!("Using cached result for {}", ctx.repo);
            ctx.log.line(format!(
                "# Cached result from {} found, skipping execution",
                entry.produced_at.to_rfc3339()
            ));
            return Ok(Produced {
                cached: true,
                diff: entry.result.diff().map(str::to_string),
                store: None,
            });
        }

        workspace::prepare_baseline(&ctx.checkout).await?;

        self.steps.run_all(ctx, spec).await?;

        ctx.status.set_executing("Computing diff");
        let diff = workspace::diff(&ctx.checkout).await?;

        let result = CachedResult::from_diff(diff);
        Ok(Produced {
            cached: false,
            diff: result.diff().map(str::to_string),
            store: Some(CacheEntry::new(key, result)),
        })
    }
}

#[async_trait]
impl ExecutionService for StandardExecutionService {
    async fn execute(
        &self,
        repo: &RepoTarget,
        spec: &ResolvedSpec,
        status: TaskHandle,
        stop: CancelToken,
    ) -> Result<TaskResult, TaskError> {
        let unique = Uuid::new_v4().simple().to_string();
        let unique = &unique[..8];

        let log = self.logs.create(repo, unique)?;
        status.set_log_location(log.path().to_path_buf());

        let checkout = self
            .work_dir
            .join(format!("sweep-{}-{}", repo.slug(), unique));
        let ctx = TaskContext::new(repo.clone(), checkout, log, status, stop, self.timeout);

        ctx.log.line(format!(
            "# Repository {} @ {} ({} steps)",
            repo.name,
            repo.revision,
            spec.steps.len()
        ));
        info!("Starting task for {}", repo);

        let result = tokio::select! {
            result = self.pipeline(&ctx, spec) => result,
            _ = tokio::time::sleep_until(ctx.deadline) => Err(TaskError::TimedOut(ctx.timeout)),
            _ = ctx.stop.cancelled() => Err(TaskError::Cancelled),
        };

        let produced = match result {
            Ok(produced) => produced,
            Err(e) => {
                error!("Task for {} failed: {}", repo, e);
                ctx.log.line(format!("# ERROR: {}", e));
                return Err(e);
            }
        };

        // Outside the race so a write is never cut off halfway
        if let Some(entry) = produced.store {
            self.cache.put(entry).await;
        }

        let patch = produced.diff.map(|diff| Patch {
            repository: repo.identity().to_string(),
            base_revision: repo.revision.clone(),
            diff,
        });

        match &patch {
            Some(patch) => {
                let stat = DiffStat::from_diff(&patch.diff);
                ctx.log.line(format!(
                    "# Done: {}, {} insertions(+), {} deletions(-)",
                    stat.description(),
                    stat.insertions,
                    stat.deletions
                ));
                info!("Task for {} produced a patch ({})", repo, stat.description());
            }
            None => {
                ctx.log.line("# Done: no changes");
                info!("Task for {} finished without changes", repo);
            }
        }

        let TaskContext { log, checkout, .. } = ctx;
        let log_location = if self.keep_logs {
            Some(log.path().to_path_buf())
        } else {
            if let Err(e) = tokio::fs::remove_dir_all(&checkout).await {
                warn!("Failed to remove checkout {}: {}", checkout.display(), e);
            }
            log.remove();
            None
        };

        Ok(TaskResult {
            cached: produced.cached,
            patch,
            log_location,
        })
    }
}
