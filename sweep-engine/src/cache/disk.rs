//! On-disk result cache
//!
//! One JSON file per entry at `<dir>/<digest[..2]>/<digest>.json`. Writes go
//! to a uniquely named temp file in the same directory and are renamed into
//! place, so readers only ever see complete entries.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::{CacheEntry, ExecutionCache};
use crate::cache::key::CacheKey;
use crate::error::CacheError;

pub struct DiskCache {
    dir: PathBuf,
    clear: bool,
}

impl DiskCache {
    /// Creates a cache rooted at `dir`
    ///
    /// # Arguments
    /// * `dir` - Root directory, created on first write
    /// * `clear` - Treat every lookup as a miss while still writing results
    pub fn new(dir: impl Into<PathBuf>, clear: bool) -> Self {
        Self {
            dir: dir.into(),
            clear,
        }
    }

    /// Path of the entry file for `key`
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let digest = key.digest();
        self.dir.join(&digest[..2]).join(format!("{}.json", digest))
    }

    async fn read(&self, path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn write(&self, path: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| CacheError::Io { path, source }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }

        let bytes = serde_json::to_vec_pretty(entry).map_err(|source| CacheError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

        let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
        fs::write(&temp_path, &bytes).await.map_err(io_err(&temp_path))?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_err(path)(e));
        }

        Ok(())
    }
}

#[async_trait]
impl ExecutionCache for DiskCache {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if self.clear {
            return None;
        }

        let path = self.entry_path(key);
        match self.read(&path).await {
            Ok(Some(entry)) if &entry.key == key => {
                debug!("Cache hit at {}", path.display());
                Some(entry)
            }
            Ok(Some(_)) => {
                warn!("Cache entry {} belongs to a different key, ignoring", path.display());
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Ignoring unreadable cache entry: {}", e);
                None
            }
        }
    }

    async fn put(&self, entry: CacheEntry) {
        let path = self.entry_path(&entry.key);
        match self.write(&path, &entry).await {
            Ok(()) => debug!("Cached result at {}", path.display()),
            Err(e) => warn!("Failed to write cache entry: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedResult;

    fn key(args: &str) -> CacheKey {
        CacheKey {
            repository: "R1".to_string(),
            revision: "main".to_string(),
            steps: vec![crate::cache::key::StepKey::Command {
                args: vec![args.to_string()],
                cache_dirs: Default::default(),
            }],
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), false);

        assert!(cache.get(&key("a")).await.is_none());

        cache
            .put(CacheEntry::new(key("a"), CachedResult::Diff("diff --git a a\n".to_string())))
            .await;
        cache.put(CacheEntry::new(key("b"), CachedResult::NoChanges)).await;

        let hit = cache.get(&key("a")).await.unwrap();
        assert_eq!(hit.result, CachedResult::Diff("diff --git a a\n".to_string()));
        assert_eq!(cache.get(&key("b")).await.unwrap().result, CachedResult::NoChanges);
    }

    #[tokio::test]
    async fn test_clear_misses_but_still_writes() {
        let dir = tempfile::tempdir().unwrap();
        let clearing = DiskCache::new(dir.path(), true);

        clearing.put(CacheEntry::new(key("a"), CachedResult::NoChanges)).await;
        assert!(clearing.get(&key("a")).await.is_none());

        let normal = DiskCache::new(dir.path(), false);
        assert!(normal.get(&key("a")).await.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), false);

        let path = cache.entry_path(&key("a"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ truncated").unwrap();

        assert!(cache.get(&key("a")).await.is_none());

        // A fresh put repairs it in place
        cache.put(CacheEntry::new(key("a"), CachedResult::NoChanges)).await;
        assert!(cache.get(&key("a")).await.is_some());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), false);
        cache.put(CacheEntry::new(key("a"), CachedResult::NoChanges)).await;

        let path = cache.entry_path(&key("a"));
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![path.file_name().unwrap().to_string_lossy().into_owned()]);
    }
}
