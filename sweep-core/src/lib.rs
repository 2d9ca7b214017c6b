//! Sweep Core
//!
//! Core types for the Sweep execution engine.
//!
//! This crate contains:
//! - Domain types: Spec, Step, RepoTarget, TaskStatus, Patch
//! - DTOs: the on-disk spec document and its validation into a Spec
//! - Diff statistics used by progress reporters
//!
//! Nothing in here performs I/O. Execution lives in `sweep-engine`.

pub mod domain;
pub mod dto;
pub mod error;

pub use domain::patch::{DiffStat, Patch};
pub use domain::repo::RepoTarget;
pub use domain::spec::{ImageSource, Spec, Step};
pub use domain::task::{TaskError, TaskState, TaskStatus};
pub use error::SpecError;
