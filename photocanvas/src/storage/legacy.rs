//! Key-value store generation
//!
//! Galleries and cached images laid out the way the first generation of the
//! app stored them:
//!
//! - `photoGalleries` holds a JSON array of listing entries
//! - `gallery_<id>` holds one full gallery document
//! - `image_cache_<key>` holds one cached image record
//!
//! This generation expires cache records on read.

use super::{eviction_count, now_ms, CacheStore, GalleryStore, KvStore, QuotaEstimator, StorageEstimate};
use crate::config::{LEGACY_CACHE_PREFIX, LEGACY_GALLERY_PREFIX, LEGACY_LISTING_KEY};
use crate::database::{CachedImageRecord, GalleryDocument, GalleryListEntry};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

pub fn gallery_key(id: &str) -> String {
    format!("{}{}", LEGACY_GALLERY_PREFIX, id)
}

pub fn cache_entry_key(cache_key: &str) -> String {
    format!("{}{}", LEGACY_CACHE_PREFIX, cache_key)
}

/// A stored cache entry, or `None` if its JSON could not be parsed
pub type StoredRecord = (String, Option<CachedImageRecord>);

/// Image cache over the key-value store
#[derive(Clone)]
pub struct KvCacheStore {
    kv: KvStore,
    expiry_ms: i64,
}

impl KvCacheStore {
    /// Records older than `expiry_ms` are dropped when read
    pub fn new(kv: KvStore, expiry_ms: i64) -> Self {
        Self { kv, expiry_ms }
    }

    /// Every cache entry with its storage key, oldest first.
    /// Unparseable entries sort first and carry `None`.
    pub async fn load_all(&self) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::new();

        for key in self.kv.keys_with_prefix(LEGACY_CACHE_PREFIX).await {
            let Some(json) = self.kv.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<CachedImageRecord>(&json) {
                Ok(record) => records.push((key, Some(record))),
                Err(e) => {
                    tracing::warn!("Corrupt cache entry {}: {}", key, e);
                    records.push((key, None));
                }
            }
        }

        records.sort_by_key(|(_, record)| record.as_ref().map_or(i64::MIN, |r| r.timestamp));
        Ok(records)
    }

    /// Remove a cache entry by its storage key
    pub async fn remove_entry(&self, storage_key: &str) -> Result<bool> {
        self.kv.remove(storage_key).await
    }
}

#[async_trait]
impl CacheStore for KvCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CachedImageRecord>> {
        let storage_key = cache_entry_key(key);
        let Some(json) = self.kv.get(&storage_key).await? else {
            return Ok(None);
        };

        let record: CachedImageRecord = match serde_json::from_str(&json) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Dropping corrupt cache entry {}: {}", key, e);
                self.kv.remove(&storage_key).await?;
                return Ok(None);
            }
        };

        if record.is_older_than(self.expiry_ms, now_ms()) {
            tracing::debug!("Cache entry expired on read: {}", key);
            self.kv.remove(&storage_key).await?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn put(&self, record: &CachedImageRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.kv.set(&cache_entry_key(&record.id), &json).await
    }

    async fn clear_expired_at(&self, max_age_ms: i64, now_ms: i64) -> Result<u64> {
        let mut removed = 0;

        for (key, record) in self.load_all().await? {
            let expired = record.map_or(true, |r| r.is_older_than(max_age_ms, now_ms));
            if expired && self.kv.remove(&key).await? {
                removed += 1;
            }
        }

        tracing::info!("Cleared {} expired cache entries", removed);
        Ok(removed)
    }

    async fn clear_all(&self) -> Result<u64> {
        let mut removed = 0;
        for key in self.kv.keys_with_prefix(LEGACY_CACHE_PREFIX).await {
            if self.kv.remove(&key).await? {
                removed += 1;
            }
        }

        tracing::info!("Cleared all {} cache entries", removed);
        Ok(removed)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.kv.keys_with_prefix(LEGACY_CACHE_PREFIX).await.len() as u64)
    }

    async fn evict_oldest(&self, fraction: f64) -> Result<u64> {
        let records = self.load_all().await?;
        let target = eviction_count(records.len() as u64, fraction);

        let mut removed = 0;
        for (key, _) in records.into_iter().take(target as usize) {
            if self.kv.remove(&key).await? {
                removed += 1;
            }
        }

        tracing::info!("Evicted {} oldest cache entries", removed);
        Ok(removed)
    }
}

/// Gallery store over the key-value store
#[derive(Clone)]
pub struct KvGalleryStore {
    kv: KvStore,
    /// Serializes read-modify-write of the listing key
    listing_lock: Arc<Mutex<()>>,
}

impl KvGalleryStore {
    pub fn new(kv: KvStore) -> Self {
        Self {
            kv,
            listing_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Whether a listing key exists at all
    pub async fn has_listing(&self) -> bool {
        self.kv.contains(LEGACY_LISTING_KEY).await
    }

    async fn read_listing(&self) -> Result<Vec<GalleryListEntry>> {
        match self.kv.get(LEGACY_LISTING_KEY).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_listing(&self, listing: &[GalleryListEntry]) -> Result<()> {
        let json = serde_json::to_string(listing)?;
        self.kv.set(LEGACY_LISTING_KEY, &json).await
    }

    /// Ids of every stored `gallery_` document, listed or not
    pub async fn stored_ids(&self) -> Vec<String> {
        self.kv
            .keys_with_prefix(LEGACY_GALLERY_PREFIX)
            .await
            .into_iter()
            .filter_map(|key| key.strip_prefix(LEGACY_GALLERY_PREFIX).map(str::to_string))
            .collect()
    }

    /// Remove the listing and the documents of `ids`. Other `gallery_` keys
    /// are left alone.
    pub async fn remove_keys(&self, ids: &[String]) -> Result<u64> {
        let _guard = self.listing_lock.lock().await;

        let mut removed = 0;
        for id in ids {
            if self.kv.remove(&gallery_key(id)).await? {
                removed += 1;
            }
        }
        if self.kv.remove(LEGACY_LISTING_KEY).await? {
            removed += 1;
        }
        Ok(removed)
    }
}

#[async_trait]
impl GalleryStore for KvGalleryStore {
    async fn save(&self, doc: &GalleryDocument) -> Result<()> {
        let _guard = self.listing_lock.lock().await;

        let key = gallery_key(&doc.id);
        let previous = self.kv.get(&key).await?;
        let json = serde_json::to_string(doc)?;

        self.kv.set(&key, &json).await?;

        let result = async {
            let mut listing = self.read_listing().await?;
            listing.retain(|entry| entry.id != doc.id);
            listing.push(doc.listing());
            self.write_listing(&listing).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Listing update failed for {}, rolling back document: {}", doc.id, e);
            match previous {
                Some(old) => self.kv.set(&key, &old).await?,
                None => {
                    self.kv.remove(&key).await?;
                }
            }
            return Err(e);
        }

        tracing::debug!("Saved gallery: {} ({} bytes)", doc.id, json.len());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<GalleryDocument>> {
        match self.kv.get(&gallery_key(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<GalleryListEntry>> {
        self.read_listing().await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.listing_lock.lock().await;

        let mut listing = self.read_listing().await?;
        let before = listing.len();
        listing.retain(|entry| entry.id != id);
        let listed = listing.len() != before;

        if listed {
            self.write_listing(&listing).await?;
        }
        let stored = self.kv.remove(&gallery_key(id)).await?;

        if listed || stored {
            tracing::debug!("Deleted gallery: {}", id);
        }
        Ok(listed || stored)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read_listing().await?.len() as u64)
    }
}

#[async_trait]
impl QuotaEstimator for KvStore {
    async fn estimate(&self) -> Result<StorageEstimate> {
        Ok(StorageEstimate {
            used_bytes: self.usage_bytes().await,
            quota_bytes: self.quota_bytes(),
        })
    }
}
