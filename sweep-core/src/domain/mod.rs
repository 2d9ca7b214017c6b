//! Core domain types
//!
//! This module contains the structures shared between the engine (which
//! mutates task state while executing) and its callers (which build specs,
//! enqueue repositories and render progress).

pub mod patch;
pub mod repo;
pub mod spec;
pub mod task;
