//! Service layer
//!
//! Services contain the per-task business logic of the engine. They
//! orchestrate collaborators (checkout, cache, container runtime) and
//! implement task execution, step running and task logging.
//!
//! Task execution is trait-based so the coordinator can be driven by a
//! substitute in tests.

mod execution;
mod steps;
mod task_log;

// Re-export traits
pub use execution::ExecutionService;

// Re-export implementations
pub use execution::StandardExecutionService;
pub use steps::{StepRunner, cache_dirs_root};
pub use task_log::{LogManager, TaskLog};
