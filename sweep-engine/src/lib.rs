//! Sweep Engine
//!
//! Applies a spec's ordered steps across many repositories in parallel and
//! produces one patch per repository that changed.
//!
//! Architecture:
//! - Configuration: engine tunables with defaults and validation
//! - Repositories: collaborators that resolve targets and fetch checkouts
//! - Images: one-time image builds and content fingerprints
//! - Cache: content-addressed on-disk results keyed on step definitions
//! - Services: per-task execution, step running and task logs
//! - Scheduler: task queue, worker pool, status map and cancellation
//! - Progress: the snapshot callback consumed by renderers
//!
//! A caller builds a [`Coordinator`], enqueues one task per repository,
//! starts it with a [`CancelToken`], waits, and collects the patches.

pub mod cache;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod images;
pub mod progress;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod workspace;

pub use config::EngineConfig;
pub use container::{CliRuntime, ContainerRuntime};
pub use error::{EngineError, RunError, TaskFailure};
pub use progress::{ProgressReporter, StatusSnapshot, Tally};
pub use repository::{CheckoutProvider, GitCheckout, ManifestResolver, RepoResolver};
pub use scheduler::{CancelToken, Coordinator};
