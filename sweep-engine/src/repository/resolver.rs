//! Repository resolution
//!
//! Turns a selection query into the list of targets a run is applied to.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use sweep_core::RepoTarget;

/// Resolves a selection query into repository targets
#[async_trait]
pub trait RepoResolver: Send + Sync {
    /// Returns every repository matched by `query`
    ///
    /// # Arguments
    /// * `query` - The spec's selection query
    async fn resolve(&self, query: &str) -> Result<Vec<RepoTarget>>;
}

/// One repository listed in a manifest file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub name: String,
    pub revision: String,
    /// Clone URL or local path
    pub source: String,
}

impl ManifestEntry {
    pub fn target(&self) -> RepoTarget {
        RepoTarget::new(&self.id, &self.name, &self.revision)
    }
}

/// [`RepoResolver`] over a static manifest
///
/// The query selects entries whose name contains it; an empty query selects
/// everything.
#[derive(Debug, Clone, Default)]
pub struct ManifestResolver {
    entries: Vec<ManifestEntry>,
}

impl ManifestResolver {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Loads a JSON manifest (a list of entries) from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let entries: Vec<ManifestEntry> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }
}

#[async_trait]
impl RepoResolver for ManifestResolver {
    async fn resolve(&self, query: &str) -> Result<Vec<RepoTarget>> {
        let query = query.trim();
        Ok(self
            .entries
            .iter()
            .filter(|entry| query.is_empty() || entry.name.contains(query))
            .map(ManifestEntry::target)
            .collect())
    }
}
