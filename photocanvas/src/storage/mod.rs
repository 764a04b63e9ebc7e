//! Storage module
//!
//! Defines the cache and gallery store contracts and their two
//! generations: the legacy key-value layout and the indexed SQLite store.

pub mod cache_key;
pub mod indexed;
pub mod kv_store;
pub mod legacy;
#[cfg(test)]
pub(crate) mod memory;

pub use cache_key::derive_cache_key;
pub use indexed::{IndexedCacheStore, IndexedGalleryStore};
pub use kv_store::KvStore;
pub use legacy::{KvCacheStore, KvGalleryStore};

use crate::database::{CachedImageRecord, GalleryDocument, GalleryListEntry};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;

/// Current time in epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Processed-image cache keyed by [`derive_cache_key`]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a record. Absent records are `None`, not an error.
    async fn get(&self, key: &str) -> Result<Option<CachedImageRecord>>;

    /// Insert or overwrite a record. Capacity failures surface as
    /// `QuotaExceeded`; the cleanup ladder lives in the cache service.
    async fn put(&self, record: &CachedImageRecord) -> Result<()>;

    /// Delete every record with `now_ms - timestamp > max_age_ms`
    async fn clear_expired_at(&self, max_age_ms: i64, now_ms: i64) -> Result<u64>;

    /// Delete every record older than `max_age_ms`, returning the count removed
    async fn clear_expired(&self, max_age_ms: i64) -> Result<u64> {
        self.clear_expired_at(max_age_ms, now_ms()).await
    }

    /// Empty the cache, returning the count removed
    async fn clear_all(&self) -> Result<u64>;

    async fn count(&self) -> Result<u64>;

    /// Delete the oldest `fraction` of the remaining records by timestamp
    async fn evict_oldest(&self, fraction: f64) -> Result<u64>;
}

/// Gallery documents plus their listing projection
#[async_trait]
pub trait GalleryStore: Send + Sync {
    /// Upsert a document and its listing entry together
    async fn save(&self, doc: &GalleryDocument) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<GalleryDocument>>;

    /// Listing entries; order is unspecified
    async fn list(&self) -> Result<Vec<GalleryListEntry>>;

    /// Remove a document and its listing entry. Missing ids are a no-op
    /// and return false.
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn count(&self) -> Result<u64>;
}

/// Space used by a store and the quota it runs under, if known
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageEstimate {
    pub used_bytes: u64,
    pub quota_bytes: Option<u64>,
}

/// Backends that can report how much space they use
#[async_trait]
pub trait QuotaEstimator: Send + Sync {
    async fn estimate(&self) -> Result<StorageEstimate>;
}

/// Number of records `fraction` of `total` covers, rounded up
pub(crate) fn eviction_count(total: u64, fraction: f64) -> u64 {
    if total == 0 || fraction <= 0.0 {
        return 0;
    }
    let fraction = fraction.min(1.0);
    ((total as f64) * fraction).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_count() {
        assert_eq!(eviction_count(0, 0.5), 0);
        assert_eq!(eviction_count(4, 0.5), 2);
        assert_eq!(eviction_count(5, 0.5), 3);
        assert_eq!(eviction_count(1, 0.5), 1);
        assert_eq!(eviction_count(10, 0.0), 0);
        assert_eq!(eviction_count(10, 2.0), 10);
    }
}
