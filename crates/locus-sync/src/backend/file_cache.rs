//! JSON-file backed key-value cache.
//!
//! The whole map lives in one file, rewritten on every change through a
//! temp file and rename so a crash never leaves a half-written cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use locus_common::RemoteError;
use locus_config::CacheConfig;

use super::KeyValueCache;

pub struct FileCache {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    /// Cache file at the configured location, see
    /// [`locus_config::cache_file_path`].
    pub fn from_config(config: &CacheConfig) -> Result<Self, RemoteError> {
        locus_config::cache_file_path(config)
            .map(Self::new)
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<BTreeMap<String, String>, RemoteError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    warn!("discarding corrupt cache file {}: {e}", self.path.display());
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(RemoteError::Unavailable(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write_file(&self, entries: &BTreeMap<String, String>) -> Result<(), RemoteError> {
        let io_err = |e: std::io::Error| {
            RemoteError::Unavailable(format!("failed to write {}: {e}", self.path.display()))
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }

    /// Run `f` against the loaded map, persisting when it reports a change.
    async fn modify<F>(&self, f: F) -> Result<(), RemoteError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_file().await?);
        }
        let Some(entries) = guard.as_mut() else {
            return Ok(());
        };
        if f(entries) {
            self.write_file(entries).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteError> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_file().await?);
        }
        Ok(guard.as_ref().and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RemoteError> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), RemoteError> {
        self.modify(|entries| entries.remove(key).is_some()).await
    }
}
