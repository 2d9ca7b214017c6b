//! Run coordinator
//!
//! Drives one spec across many repositories:
//! - `enqueue` registers one task per repository, rejecting duplicates
//! - `start` resolves images once, then launches a fixed pool of workers
//!   pulling tasks from an in-memory queue
//! - `wait` blocks until every task is terminal or the run is cancelled
//! - `collect` returns the patches of successful tasks
//!
//! A task failure is recorded on that task and never stops its siblings.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use sweep_core::{Patch, RepoTarget, Spec, TaskError};

use crate::cache::{DiskCache, ExecutionCache, NoopCache};
use crate::config::EngineConfig;
use crate::container::ContainerRuntime;
use crate::error::{EngineError, RunError};
use crate::images::{ImageResolver, ResolvedSpec};
use crate::progress::{ProgressReporter, StatusSnapshot};
use crate::repository::CheckoutProvider;
use crate::scheduler::{CancelToken, StatusHub};
use crate::service::{ExecutionService, StandardExecutionService};

type Queue = Arc<Mutex<VecDeque<RepoTarget>>>;

/// Coordinates the execution of one spec across enqueued repositories
pub struct Coordinator {
    config: EngineConfig,
    images: Arc<ImageResolver>,
    service: Arc<dyn ExecutionService>,
    hub: Arc<StatusHub>,
    reporter: Option<Arc<dyn ProgressReporter>>,
    pending: Vec<RepoTarget>,
    started: bool,
    run: Option<Run>,
}

/// Background tasks of a started run
struct Run {
    driver: JoinHandle<Result<(), EngineError>>,
    ticker: Option<JoinHandle<()>>,
    cancel: CancelToken,
}

impl Coordinator {
    /// Creates a coordinator wired to the standard execution service
    ///
    /// # Arguments
    /// * `spec` - The validated spec to apply
    /// * `config` - Engine configuration
    /// * `runtime` - Container runtime for image builds and container steps
    /// * `checkout` - Provider materializing repository checkouts
    ///
    /// # Errors
    /// [`EngineError::Config`] if the configuration does not validate
    pub fn new(
        spec: Spec,
        config: EngineConfig,
        runtime: Arc<dyn ContainerRuntime>,
        checkout: Arc<dyn CheckoutProvider>,
    ) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let cache: Arc<dyn ExecutionCache> = match &config.cache_dir {
            Some(dir) => Arc::new(DiskCache::new(dir.clone(), config.clear_cache)),
            None => Arc::new(NoopCache),
        };
        let service = Arc::new(StandardExecutionService::new(
            &config,
            checkout,
            Arc::clone(&runtime),
            cache,
        ));

        Ok(Self::with_service(spec, config, runtime, service))
    }

    /// Creates a coordinator that runs tasks through `service`
    pub fn with_service(
        spec: Spec,
        config: EngineConfig,
        runtime: Arc<dyn ContainerRuntime>,
        service: Arc<dyn ExecutionService>,
    ) -> Self {
        Self {
            images: Arc::new(ImageResolver::new(Arc::new(spec), runtime)),
            config,
            service,
            hub: Arc::new(StatusHub::new()),
            reporter: None,
            pending: Vec::new(),
            started: false,
            run: None,
        }
    }

    /// Attaches a progress reporter
    pub fn with_progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Registers a task for `repo`
    ///
    /// # Errors
    /// - [`EngineError::DuplicateRepo`] if the identity is already enqueued
    /// - [`EngineError::AlreadyStarted`] once `start` has been called
    pub fn enqueue(&mut self, repo: RepoTarget) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }

        self.hub.insert(repo.clone())?;
        debug!("Enqueued {}", repo);
        self.pending.push(repo);

        if let Some(reporter) = &self.reporter {
            reporter.on_update(&self.hub.snapshot());
        }
        Ok(())
    }

    /// Launches the run in the background and returns immediately
    ///
    /// # Arguments
    /// * `cancel` - Token that stops new steps and tasks and aborts in-flight ones
    pub fn start(&mut self, cancel: CancelToken) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        self.started = true;

        let queue: Queue = Arc::new(Mutex::new(self.pending.drain(..).collect()));
        info!(
            "Starting run of {} task(s) with parallelism {}",
            self.hub.len(),
            self.config.parallelism
        );

        let driver = tokio::spawn(drive(
            Arc::clone(&self.images),
            Arc::clone(&self.service),
            Arc::clone(&self.hub),
            queue,
            cancel.clone(),
            self.config.parallelism,
        ));

        let ticker = self.reporter.clone().map(|reporter| {
            tokio::spawn(report_loop(
                Arc::clone(&self.hub),
                reporter,
                self.config.update_interval,
            ))
        });

        self.run = Some(Run {
            driver,
            ticker,
            cancel,
        });
        Ok(())
    }

    /// Waits for the run to finish
    ///
    /// Returns once every task is terminal, or once in-flight tasks have
    /// observed cancellation. Never returns early because a task failed.
    ///
    /// # Errors
    /// - [`RunError::Setup`] if image resolution failed and nothing ran
    /// - [`RunError::Cancelled`] if the run was cancelled before completing
    /// - [`RunError::TasksFailed`] with every failed task, sorted by repository name
    pub async fn wait(&mut self) -> Result<(), RunError> {
        let Some(run) = self.run.take() else {
            if self.hub.is_empty() || self.started {
                return Ok(());
            }
            return Err(RunError::Setup(EngineError::NotStarted));
        };

        let setup = match run.driver.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::Worker(e.to_string())),
        };

        if let Some(ticker) = run.ticker {
            ticker.abort();
        }
        if let Some(reporter) = &self.reporter {
            reporter.on_update(&self.hub.snapshot());
        }

        if let Err(e) = setup {
            error!("Run aborted: {}", e);
            return Err(RunError::Setup(e));
        }

        let failures = self.hub.failures();
        let interrupted = !self.hub.all_terminal()
            || failures
                .iter()
                .any(|failure| failure.error == TaskError::Cancelled);

        if run.cancel.is_cancelled() && interrupted {
            info!("Run cancelled with {} failed task(s)", failures.len());
            return Err(RunError::Cancelled(failures));
        }

        let unfinished = self.hub.unfinished();
        if !unfinished.is_empty() {
            error!("Run ended with {} unfinished task(s)", unfinished.len());
            return Err(RunError::Incomplete {
                unfinished,
                failures,
            });
        }

        if !failures.is_empty() {
            info!("Run finished with {} failed task(s)", failures.len());
            return Err(RunError::TasksFailed(failures));
        }

        info!("Run finished successfully");
        Ok(())
    }

    /// Patches of successful tasks, sorted by repository name
    pub fn collect(&self) -> Vec<Patch> {
        self.hub.patches()
    }

    /// Deep copy of the current status of every task
    pub fn statuses(&self) -> StatusSnapshot {
        self.hub.snapshot()
    }
}

/// Resolves images, then runs the worker pool to completion
async fn drive(
    images: Arc<ImageResolver>,
    service: Arc<dyn ExecutionService>,
    hub: Arc<StatusHub>,
    queue: Queue,
    cancel: CancelToken,
    parallelism: usize,
) -> Result<(), EngineError> {
    let queued = queue.lock().unwrap().len();
    if queued == 0 {
        return Ok(());
    }

    let spec = tokio::select! {
        spec = images.realize() => spec?,
        _ = cancel.cancelled() => {
            info!("Run cancelled before images were resolved");
            return Ok(());
        }
    };

    let mut workers = JoinSet::new();
    for worker in 0..parallelism.min(queued) {
        workers.spawn(work(
            worker,
            Arc::clone(&spec),
            Arc::clone(&service),
            Arc::clone(&hub),
            Arc::clone(&queue),
            cancel.clone(),
        ));
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!("Worker failed: {}", e);
        }
    }

    Ok(())
}

/// Worker loop: pops tasks until the queue is empty or the run is cancelled
async fn work(
    worker: usize,
    spec: Arc<ResolvedSpec>,
    service: Arc<dyn ExecutionService>,
    hub: Arc<StatusHub>,
    queue: Queue,
    cancel: CancelToken,
) {
    debug!("Worker {} started", worker);

    loop {
        if cancel.is_cancelled() {
            debug!("Worker {} stopping: run cancelled", worker);
            break;
        }

        let Some(repo) = queue.lock().unwrap().pop_front() else {
            break;
        };

        let identity = repo.identity().to_string();
        hub.mark_started(&identity);

        // A task that panics must still reach a terminal state
        let execution = tokio::spawn({
            let service = Arc::clone(&service);
            let spec = Arc::clone(&spec);
            let status = hub.handle(&identity);
            let stop = cancel.clone();
            async move { service.execute(&repo, &spec, status, stop).await }
        });
        let outcome = match execution.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Task for {} aborted: {}", identity, e);
                Err(TaskError::Aborted(e.to_string()))
            }
        };
        hub.mark_finished(&identity, outcome);
    }

    debug!("Worker {} finished", worker);
}

/// Sends a snapshot whenever something changed, at most once per interval
async fn report_loop(
    hub: Arc<StatusHub>,
    reporter: Arc<dyn ProgressReporter>,
    interval: Duration,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if hub.take_dirty() {
            reporter.on_update(&hub.snapshot());
        }
    }
}
