//! Indexed store generation
//!
//! Both collections live in the shared SQLite database. Gallery saves and
//! deletes run in one transaction spanning the document and its listing
//! row. Cache reads never expire records; expiry is an explicit sweep.

use super::{eviction_count, CacheStore, GalleryStore, QuotaEstimator, StorageEstimate};
use crate::database::{CachedImageRecord, Database, GalleryDocument, GalleryListEntry, Repository};
use crate::error::Result;
use async_trait::async_trait;

async fn repository(db: &Database) -> Result<Repository> {
    Ok(Repository::new(db.pool().await?))
}

/// Image cache backed by the `image_cache` table
#[derive(Clone)]
pub struct IndexedCacheStore {
    db: Database,
}

impl IndexedCacheStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records produced from files with this name, newest first
    pub async fn find_by_name(&self, original_name: &str) -> Result<Vec<CachedImageRecord>> {
        repository(&self.db)
            .await?
            .find_cached_by_name(original_name)
            .await
    }

    pub async fn remove(&self, key: &str) -> Result<bool> {
        repository(&self.db).await?.delete_cached_image(key).await
    }
}

#[async_trait]
impl CacheStore for IndexedCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CachedImageRecord>> {
        repository(&self.db).await?.get_cached_image(key).await
    }

    async fn put(&self, record: &CachedImageRecord) -> Result<()> {
        repository(&self.db).await?.put_cached_image(record).await
    }

    async fn clear_expired_at(&self, max_age_ms: i64, now_ms: i64) -> Result<u64> {
        // Old means now - timestamp > max_age, i.e. timestamp < now - max_age
        let cutoff = now_ms.saturating_sub(max_age_ms);
        let removed = repository(&self.db)
            .await?
            .delete_cached_before(cutoff)
            .await?;

        tracing::info!("Cleared {} expired cache entries", removed);
        Ok(removed)
    }

    async fn clear_all(&self) -> Result<u64> {
        let removed = repository(&self.db).await?.clear_cached_images().await?;
        tracing::info!("Cleared all {} cache entries", removed);
        Ok(removed)
    }

    async fn count(&self) -> Result<u64> {
        repository(&self.db).await?.count_cached_images().await
    }

    async fn evict_oldest(&self, fraction: f64) -> Result<u64> {
        let repo = repository(&self.db).await?;
        let target = eviction_count(repo.count_cached_images().await?, fraction);
        let removed = repo.delete_oldest_cached(target).await?;

        tracing::info!("Evicted {} oldest cache entries", removed);
        Ok(removed)
    }
}

/// Gallery store backed by the `galleries` and `gallery_list` tables
#[derive(Clone)]
pub struct IndexedGalleryStore {
    db: Database,
}

impl IndexedGalleryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Listing entries for galleries with exactly this name
    pub async fn find_by_name(&self, name: &str) -> Result<Vec<GalleryListEntry>> {
        repository(&self.db).await?.find_galleries_by_name(name).await
    }
}

#[async_trait]
impl GalleryStore for IndexedGalleryStore {
    async fn save(&self, doc: &GalleryDocument) -> Result<()> {
        repository(&self.db).await?.save_gallery(doc).await
    }

    async fn get(&self, id: &str) -> Result<Option<GalleryDocument>> {
        repository(&self.db).await?.get_gallery(id).await
    }

    async fn list(&self) -> Result<Vec<GalleryListEntry>> {
        repository(&self.db).await?.list_galleries().await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        repository(&self.db).await?.delete_gallery(id).await
    }

    async fn count(&self) -> Result<u64> {
        repository(&self.db).await?.count_galleries().await
    }
}

#[async_trait]
impl QuotaEstimator for Database {
    async fn estimate(&self) -> Result<StorageEstimate> {
        let usage = self.usage().await?;
        Ok(StorageEstimate {
            used_bytes: usage.used_bytes,
            quota_bytes: usage.quota_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CACHE_EXPIRY_MS;
    use crate::database::Dimensions;
    use crate::storage::now_ms;

    fn cached(id: &str, timestamp: i64) -> CachedImageRecord {
        CachedImageRecord {
            id: id.to_string(),
            original_name: "photo.jpg".to_string(),
            processed_url: "data:image/jpeg;base64,AAAA".to_string(),
            thumbnail_url: "data:image/jpeg;base64,BBBB".to_string(),
            original_size: Dimensions::new(640, 480),
            processed_size: Dimensions::new(640, 480),
            file_size: 500,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_get_does_not_expire() {
        let cache = IndexedCacheStore::new(Database::in_memory(None));

        let ancient = now_ms() - CACHE_EXPIRY_MS * 10;
        cache.put(&cached("old", ancient)).await.unwrap();

        let fetched = cache.get("old").await.unwrap().unwrap();
        assert_eq!(fetched.timestamp, ancient);
    }

    #[tokio::test]
    async fn test_clear_expired_boundary() {
        let cache = IndexedCacheStore::new(Database::in_memory(None));
        let now = 10_000_000;
        let max_age = 5_000;

        cache.put(&cached("older", now - max_age - 1)).await.unwrap();
        cache.put(&cached("tie", now - max_age)).await.unwrap();
        cache.put(&cached("newer", now - max_age + 1)).await.unwrap();

        assert_eq!(cache.clear_expired_at(max_age, now).await.unwrap(), 1);
        assert!(cache.get("older").await.unwrap().is_none());
        assert!(cache.get("tie").await.unwrap().is_some());
        assert!(cache.get("newer").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_evict_oldest_rounds_up() {
        let cache = IndexedCacheStore::new(Database::in_memory(None));

        for i in 0..3 {
            cache.put(&cached(&format!("k{}", i), i)).await.unwrap();
        }

        assert_eq!(cache.evict_oldest(0.5).await.unwrap(), 2);
        assert_eq!(cache.count().await.unwrap(), 1);
        assert!(cache.get("k2").await.unwrap().is_some());
        assert_eq!(cache.find_by_name("photo.jpg").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gallery_store_shares_handle_with_cache() {
        let db = Database::in_memory(None);
        let galleries = IndexedGalleryStore::new(db.clone());
        let cache = IndexedCacheStore::new(db.clone());

        galleries
            .save(&GalleryDocument::new("Trip", None))
            .await
            .unwrap();
        cache.put(&cached("k", now_ms())).await.unwrap();

        assert_eq!(galleries.count().await.unwrap(), 1);
        assert_eq!(cache.count().await.unwrap(), 1);
        assert_eq!(galleries.find_by_name("Trip").await.unwrap().len(), 1);
        assert_eq!(db.open_count(), 1);
    }

    #[tokio::test]
    async fn test_estimate_reports_usage() {
        let db = Database::in_memory(Some(512 * 1024));
        let estimate = db.estimate().await.unwrap();

        assert!(estimate.used_bytes > 0);
        assert_eq!(estimate.quota_bytes, Some(512 * 1024));
    }
}
