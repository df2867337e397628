//! Disk cache tier.
//!
//! One pretty-printed JSON file per key, named `<scope>__<kind>.json` so the
//! directory can be inspected with ordinary tools. Writes go to a temporary
//! file in the same directory which is then renamed over the target.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CacheEntry, CacheKey, CacheTier, CacheTierBackend, TierError, TierResult};

/// File-per-entry disk tier
#[derive(Debug, Clone)]
pub struct DiskTier {
    root: PathBuf,
}

impl DiskTier {
    /// Create a tier rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> TierResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(io_error)?;
        Ok(Self { root })
    }

    /// Directory holding the entry files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File an entry is stored in
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.json", key.storage_name()))
    }

    fn write_atomic(root: &Path, path: &Path, json: &[u8]) -> std::io::Result<()> {
        let mut file = tempfile::NamedTempFile::new_in(root)?;
        file.write_all(json)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn io_error(source: std::io::Error) -> TierError {
    TierError::Io {
        tier: CacheTier::Disk,
        source,
    }
}

fn corrupt(path: &Path, message: impl std::fmt::Display) -> TierError {
    TierError::Corrupt {
        tier: CacheTier::Disk,
        key: path.display().to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl CacheTierBackend for DiskTier {
    fn tier(&self) -> CacheTier {
        CacheTier::Disk
    }

    async fn get(&self, key: &CacheKey) -> TierResult<Option<Arc<CacheEntry>>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };

        let entry: CacheEntry = serde_json::from_slice(&bytes).map_err(|e| corrupt(&path, e))?;
        if entry.key != *key {
            return Err(corrupt(&path, format!("entry belongs to {}", entry.key)));
        }
        Ok(Some(Arc::new(entry)))
    }

    async fn put(&self, entry: Arc<CacheEntry>) -> TierResult<()> {
        let path = self.path_for(&entry.key);
        let json = serde_json::to_vec_pretty(entry.as_ref()).map_err(|e| corrupt(&path, e))?;
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || Self::write_atomic(&root, &path, &json))
            .await
            .map_err(|e| TierError::Unavailable {
                tier: CacheTier::Disk,
                message: e.to_string(),
            })?
            .map_err(io_error)
    }

    async fn invalidate(&self, key: &CacheKey) -> TierResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn scan(&self) -> TierResult<Vec<Arc<CacheEntry>>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await.map_err(io_error)?;

        while let Some(item) = dir.next_entry().await.map_err(io_error)? {
            let path = item.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<CacheEntry>(&bytes).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(entry) if self.path_for(&entry.key) == path => entries.push(Arc::new(entry)),
                Ok(_) => debug!(path = %path.display(), "skipping misnamed cache file"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "removing unreadable cache file");
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }

        Ok(entries)
    }
}
