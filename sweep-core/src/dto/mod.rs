//! Data Transfer Objects
//!
//! Raw, serde-facing shapes of documents that cross the engine boundary.
//! DTOs are validated into domain types before anything executes.

pub mod spec;
