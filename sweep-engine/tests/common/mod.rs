//! Fake collaborators shared by the scenario tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;

use sweep_core::{ImageSource, RepoTarget, Spec, Step};
use sweep_engine::cache::{CacheEntry, CacheKey, ExecutionCache};
use sweep_engine::container::{ContainerRun, ContainerRuntime};
use sweep_engine::error::RuntimeError;
use sweep_engine::{
    CancelToken, CheckoutProvider, Coordinator, EngineConfig, ProgressReporter, RunError,
    StatusSnapshot,
};

/// Checkout provider that writes a fixed file set per repository id
#[derive(Default)]
pub struct FakeCheckout {
    pub files: HashMap<String, Vec<(String, String)>>,
    pub failing: BTreeSet<String>,
    pub checkouts: AtomicUsize,
}

impl FakeCheckout {
    pub fn with_repo(mut self, id: &str, files: &[(&str, &str)]) -> Self {
        self.files.insert(
            id.to_string(),
            files
                .iter()
                .map(|(path, contents)| (path.to_string(), contents.to_string()))
                .collect(),
        );
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

#[async_trait]
impl CheckoutProvider for FakeCheckout {
    async fn checkout(&self, repo: &RepoTarget, dest: &Path) -> Result<()> {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(repo.identity()) {
            anyhow::bail!("remote hung up unexpectedly");
        }
        for (path, contents) in self.files.get(repo.identity()).into_iter().flatten() {
            let path = dest.join(path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, contents).await?;
        }
        Ok(())
    }
}

/// Container runtime that runs step args directly on the host
///
/// Built image ids are derived from recipe bytes, so identical recipes give
/// identical ids across runtimes. Tags resolve through `tags`.
#[derive(Default)]
pub struct FakeRuntime {
    pub tags: Mutex<HashMap<String, String>>,
    pub builds: AtomicUsize,
    pub runs: Mutex<Vec<ContainerRun>>,
    pub killed: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn with_tag(self, tag: &str, content: &str) -> Self {
        self.tags
            .lock()
            .unwrap()
            .insert(tag.to_string(), content.to_string());
        self
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn build(&self, recipe: &str) -> Result<String, RuntimeError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "sha256:{}",
            hex::encode(Sha256::digest(recipe.as_bytes()))
        ))
    }

    async fn content_fingerprint(&self, image: &str) -> Result<String, RuntimeError> {
        if image.starts_with("sha256:") {
            return Ok(image.to_string());
        }
        self.tags
            .lock()
            .unwrap()
            .get(image)
            .cloned()
            .ok_or_else(|| RuntimeError::EmptyFingerprint(image.to_string()))
    }

    fn run_command(&self, run: &ContainerRun) -> Command {
        self.runs.lock().unwrap().push(run.clone());
        let mut command = Command::new(&run.args[0]);
        command.args(&run.args[1..]).current_dir(&run.checkout);
        command
    }

    async fn kill(&self, name: &str) -> Result<(), RuntimeError> {
        self.killed.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Reporter that remembers the highest number of simultaneously running tasks
#[derive(Default)]
pub struct PeakReporter {
    pub peak_running: AtomicUsize,
    pub updates: AtomicUsize,
}

impl ProgressReporter for PeakReporter {
    fn on_update(&self, snapshot: &StatusSnapshot) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let running = snapshot.values().filter(|status| status.is_running()).count();
        self.peak_running.fetch_max(running, Ordering::SeqCst);
    }
}

pub fn sh(script: &str) -> Step {
    Step::Command {
        args: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        cache_dirs: BTreeSet::new(),
    }
}

pub fn container(image: ImageSource, script: &str, cache_dirs: &[&str]) -> Step {
    Step::Container {
        image,
        cache_dirs: cache_dirs.iter().map(|dir| dir.to_string()).collect(),
        args: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
    }
}

pub fn spec(steps: Vec<Step>) -> Spec {
    Spec {
        selection_query: String::new(),
        steps,
    }
}

pub fn repo(id: &str, name: &str) -> RepoTarget {
    RepoTarget::new(id, name, "main")
}

/// Scratch directories of one test
pub struct Scratch {
    pub work: tempfile::TempDir,
    pub cache: tempfile::TempDir,
}

impl Scratch {
    pub fn new() -> Self {
        Self {
            work: tempfile::tempdir().unwrap(),
            cache: tempfile::tempdir().unwrap(),
        }
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig::new(self.work.path().to_path_buf())
            .with_cache_dir(self.cache.path().to_path_buf())
            .with_parallelism(2)
            .with_task_timeout(Duration::from_secs(30))
    }

    /// Files directly in the work dir whose name ends with `suffix`
    pub fn work_files(&self, suffix: &str) -> Vec<PathBuf> {
        std::fs::read_dir(self.work.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.to_string_lossy().ends_with(suffix))
            .collect()
    }
}

/// Runs a whole spec to completion and returns the coordinator for inspection
/// Cache that always misses and takes `delay` to store each entry
pub struct SlowCache {
    pub delay: Duration,
    pub stored: Mutex<Vec<CacheEntry>>,
}

impl SlowCache {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            stored: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ExecutionCache for SlowCache {
    async fn get(&self, _key: &CacheKey) -> Option<CacheEntry> {
        None
    }

    async fn put(&self, entry: CacheEntry) {
        tokio::time::sleep(self.delay).await;
        self.stored.lock().unwrap().push(entry);
    }
}

pub async fn run(
    spec: Spec,
    config: EngineConfig,
    runtime: Arc<FakeRuntime>,
    checkout: Arc<FakeCheckout>,
    repos: &[RepoTarget],
) -> (Coordinator, Result<(), RunError>) {
    let mut coordinator = Coordinator::new(spec, config, runtime, checkout).unwrap();
    for repo in repos {
        coordinator.enqueue(repo.clone()).unwrap();
    }
    coordinator.start(CancelToken::new()).unwrap();
    let result = coordinator.wait().await;
    (coordinator, result)
}
