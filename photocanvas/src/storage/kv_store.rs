//! Directory-backed key-value store
//!
//! Each key is one file whose name is the URL-safe base64 encoding of the key.
//! Values are UTF-8 strings (JSON in practice). Writes go through a temp file
//! and a rename so a crash never leaves a half-written value behind.
//!
//! The store keeps an in-memory index of entry sizes so it can enforce an
//! optional byte quota the way a browser enforces one on local storage:
//! a write that would push usage past the quota is rejected with
//! `QuotaExceeded` and leaves the previous value in place.

use crate::error::{AppError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

const TEMP_EXTENSION: &str = "tmp";

/// Key-value store persisted as one file per key
#[derive(Clone)]
pub struct KvStore {
    root: PathBuf,
    quota_bytes: Option<u64>,
    /// key -> accounted size (key length + value length)
    index: Arc<RwLock<HashMap<String, u64>>>,
}

impl KvStore {
    /// Create a new store at the given root directory
    pub fn new(root: PathBuf, quota_bytes: Option<u64>) -> Self {
        Self {
            root,
            quota_bytes,
            index: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Initialize the store (create directory if needed, load the size index)
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;

        let mut index = HashMap::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            // Leftover from an interrupted write
            if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                tracing::warn!("Removing stale temp file: {:?}", path);
                fs::remove_file(&path).await?;
                continue;
            }

            let Some(key) = path.file_name().and_then(|name| name.to_str()).and_then(decode_key)
            else {
                tracing::debug!("Skipping unrecognized file in kv store: {:?}", path);
                continue;
            };

            let value_len = entry.metadata().await?.len();
            index.insert(key.clone(), key.len() as u64 + value_len);
        }

        let count = index.len();
        *self.index.write().await = index;

        tracing::info!(
            "Key-value store initialized at: {:?} ({} entries)",
            self.root,
            count
        );
        Ok(())
    }

    /// Read a value
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.get_path(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a value, replacing any previous one
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let size = key.len() as u64 + value.len() as u64;

        // Held across the write so concurrent sets cannot both pass the quota check
        let mut index = self.index.write().await;

        if let Some(quota) = self.quota_bytes {
            let current: u64 = index.values().sum();
            let previous = index.get(key).copied().unwrap_or(0);
            let projected = current - previous + size;
            if projected > quota {
                return Err(AppError::QuotaExceeded(format!(
                    "writing {} needs {} bytes, {} of {} in use",
                    key, size, current, quota
                )));
            }
        }

        let path = self.get_path(key);
        let temp_path = path.with_extension(TEMP_EXTENSION);
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(value.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &path).await?;

        index.insert(key.to_string(), size);

        tracing::debug!("Wrote key: {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Remove a key. Returns false if it was not present.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let mut index = self.index.write().await;

        match fs::remove_file(self.get_path(key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                index.remove(key);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        index.remove(key);
        tracing::debug!("Removed key: {}", key);
        Ok(true)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.index.read().await.contains_key(key)
    }

    /// All keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.index.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys starting with `prefix`, sorted
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .index
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Bytes accounted against the quota
    pub async fn usage_bytes(&self) -> u64 {
        self.index.read().await.values().sum()
    }

    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_bytes
    }

    /// Get store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn get_path(&self, key: &str) -> PathBuf {
        self.root.join(URL_SAFE_NO_PAD.encode(key.as_bytes()))
    }
}

fn decode_key(file_name: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(file_name).ok()?;
    String::from_utf8(bytes).ok()
}
