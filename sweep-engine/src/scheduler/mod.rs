//! Scheduler layer
//!
//! Owns the task queue, the worker pool and the status map of a run, and
//! drives every task from enqueue to a terminal state.

mod cancel;
pub mod coordinator;
mod status;

pub use cancel::CancelToken;
pub use coordinator::Coordinator;
pub use status::{StatusHub, TaskHandle, TaskResult};
