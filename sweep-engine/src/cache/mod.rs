//! Content-addressed result cache
//!
//! Maps a [`CacheKey`] to the outcome of a previous task run. Cache failures
//! never fail a task: lookups degrade to a miss and failed writes are logged.

mod disk;
pub mod key;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use disk::DiskCache;
pub use key::{CacheKey, StepKey};

/// What a task produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "diff", rename_all = "camelCase")]
pub enum CachedResult {
    /// Steps succeeded without touching the tree
    NoChanges,
    Diff(String),
}

impl CachedResult {
    pub fn from_diff(diff: String) -> Self {
        if diff.is_empty() {
            CachedResult::NoChanges
        } else {
            CachedResult::Diff(diff)
        }
    }

    pub fn diff(&self) -> Option<&str> {
        match self {
            CachedResult::NoChanges => None,
            CachedResult::Diff(diff) => Some(diff),
        }
    }
}

/// A persisted result together with the key it was produced for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub result: CachedResult,
    pub produced_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, result: CachedResult) -> Self {
        Self {
            key,
            result,
            produced_at: Utc::now(),
        }
    }
}

/// Cache backend used by task execution
#[async_trait]
pub trait ExecutionCache: Send + Sync {
    /// Looks up a previous result, `None` on miss or any read problem
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Stores a result, replacing any previous entry for the same key
    async fn put(&self, entry: CacheEntry);
}

/// Cache used when caching is disabled
pub struct NoopCache;

#[async_trait]
impl ExecutionCache for NoopCache {
    async fn get(&self, _key: &CacheKey) -> Option<CacheEntry> {
        None
    }

    async fn put(&self, _entry: CacheEntry) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_diff_empty_is_no_changes() {
        assert_eq!(CachedResult::from_diff(String::new()), CachedResult::NoChanges);
        assert_eq!(
            CachedResult::from_diff("x".to_string()).diff(),
            Some("x")
        );
    }

    #[test]
    fn test_no_changes_marker_is_explicit_in_json() {
        let json = serde_json::to_value(CachedResult::NoChanges).unwrap();
        assert_eq!(json["outcome"], "noChanges");

        let json = serde_json::to_value(CachedResult::Diff("d".to_string())).unwrap();
        assert_eq!(json["outcome"], "diff");
        assert_eq!(json["diff"], "d");
    }
}
