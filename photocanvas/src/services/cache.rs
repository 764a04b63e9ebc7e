//! Image cache service
//!
//! Wraps a [`CacheStore`] with the cleanup ladder applied when a write is
//! rejected for lack of space:
//!
//! 1. clear entries older than the tightened pressure window
//! 2. evict the oldest share of what is left
//! 3. clear the whole cache
//!
//! The write is retried after each step. If it still fails the caller gets
//! `StorageFull`, the only cache failure that is surfaced.

use crate::config::{AGGRESSIVE_EVICTION_FRACTION, PRESSURE_EXPIRY_MS};
use crate::database::CachedImageRecord;
use crate::error::{AppError, Remediation, Result};
use crate::storage::CacheStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct ImageCacheService {
    store: Arc<dyn CacheStore>,
    pressure_expiry_ms: i64,
    eviction_fraction: f64,
}

impl ImageCacheService {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            pressure_expiry_ms: PRESSURE_EXPIRY_MS,
            eviction_fraction: AGGRESSIVE_EVICTION_FRACTION,
        }
    }

    pub fn with_pressure_expiry(mut self, pressure_expiry_ms: i64) -> Self {
        self.pressure_expiry_ms = pressure_expiry_ms;
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub async fn get(&self, key: &str) -> Result<Option<CachedImageRecord>> {
        self.store.get(key).await
    }

    /// Write a record, running the cleanup ladder on capacity failures.
    /// Returns the remediation steps that were needed.
    pub async fn put(&self, record: &CachedImageRecord) -> Result<Vec<Remediation>> {
        let mut steps = Vec::new();

        let err = match self.store.put(record).await {
            Ok(()) => return Ok(steps),
            Err(e) if e.is_capacity() => e,
            Err(e) => return Err(e),
        };
        tracing::warn!("Cache write for {} hit the quota: {}", record.id, err);

        for step in [
            Remediation::ClearExpiredCache,
            Remediation::EvictOldestCache,
            Remediation::ClearAllCache,
        ] {
            let removed = match step {
                Remediation::ClearExpiredCache => {
                    self.store.clear_expired(self.pressure_expiry_ms).await?
                }
                Remediation::EvictOldestCache => {
                    self.store.evict_oldest(self.eviction_fraction).await?
                }
                Remediation::ClearAllCache => self.store.clear_all().await?,
                // Documents are stripped by the gallery ladder
                Remediation::StripDocument => continue,
            };
            steps.push(step);
            tracing::info!("Cache cleanup ({}) removed {} entries", step, removed);

            match self.store.put(record).await {
                Ok(()) => {
                    tracing::info!("Cache write for {} succeeded after {}", record.id, step);
                    return Ok(steps);
                }
                Err(e) if e.is_capacity() => continue,
                Err(e) => return Err(e),
            }
        }

        tracing::error!("Cache write for {} failed after full cleanup", record.id);
        Err(AppError::StorageFull { steps })
    }

    pub async fn clear_expired(&self, max_age_ms: i64) -> Result<u64> {
        self.store.clear_expired(max_age_ms).await
    }

    pub async fn clear_all(&self) -> Result<u64> {
        self.store.clear_all().await
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CACHE_EXPIRY_MS;
    use crate::database::Dimensions;
    use crate::storage::memory::MemoryCacheStore;
    use crate::storage::now_ms;
    use std::sync::atomic::Ordering;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn cached(id: &str, timestamp: i64) -> CachedImageRecord {
        CachedImageRecord {
            id: id.to_string(),
            original_name: format!("{}.jpg", id),
            processed_url: "data:image/jpeg;base64,AAAA".to_string(),
            thumbnail_url: "data:image/jpeg;base64,BBBB".to_string(),
            original_size: Dimensions::new(100, 100),
            processed_size: Dimensions::new(100, 100),
            file_size: 10,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_put_without_pressure_needs_no_steps() {
        let store = Arc::new(MemoryCacheStore::default());
        let service = ImageCacheService::new(store.clone());

        let steps = service.put(&cached("a", now_ms())).await.unwrap();
        assert!(steps.is_empty());
        assert_eq!(service.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pressure_expiry_frees_room() {
        let store = Arc::new(MemoryCacheStore::with_capacity(2));
        let service = ImageCacheService::new(store.clone());
        let now = now_ms();

        service.put(&cached("four_days", now - 4 * DAY_MS)).await.unwrap();
        service.put(&cached("one_day", now - DAY_MS)).await.unwrap();

        // Four days old survives the 7-day window but not the 3-day one
        let steps = service.put(&cached("new", now)).await.unwrap();

        assert_eq!(steps, vec![Remediation::ClearExpiredCache]);
        assert_eq!(store.ids(), vec!["new".to_string(), "one_day".to_string()]);
        assert!(4 * DAY_MS < CACHE_EXPIRY_MS);
    }

    #[tokio::test]
    async fn test_eviction_drops_oldest_half_when_nothing_expired() {
        let store = Arc::new(MemoryCacheStore::with_capacity(4));
        let service = ImageCacheService::new(store.clone());
        let now = now_ms();

        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            service.put(&cached(id, now - 1000 + i as i64)).await.unwrap();
        }

        let steps = service.put(&cached("e", now)).await.unwrap();

        assert_eq!(
            steps,
            vec![Remediation::ClearExpiredCache, Remediation::EvictOldestCache]
        );
        assert_eq!(
            store.ids(),
            vec!["c".to_string(), "d".to_string(), "e".to_string()]
        );
    }

    #[tokio::test]
    async fn test_clear_all_then_storage_full() {
        let store = Arc::new(MemoryCacheStore::default());
        let service = ImageCacheService::new(store.clone());
        service.put(&cached("a", now_ms())).await.unwrap();

        // Every attempt fails: the original write plus one retry per step
        store.fail_puts.store(4, Ordering::SeqCst);
        let err = service.put(&cached("b", now_ms())).await.unwrap_err();

        match err {
            AppError::StorageFull { steps } => assert_eq!(
                steps,
                vec![
                    Remediation::ClearExpiredCache,
                    Remediation::EvictOldestCache,
                    Remediation::ClearAllCache,
                ]
            ),
            other => panic!("expected StorageFull, got {:?}", other),
        }
        assert_eq!(service.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_succeeds_after_clear_all() {
        let store = Arc::new(MemoryCacheStore::default());
        let service = ImageCacheService::new(store.clone());

        store.fail_puts.store(3, Ordering::SeqCst);
        let steps = service.put(&cached("b", now_ms())).await.unwrap();

        assert_eq!(steps.last(), Some(&Remediation::ClearAllCache));
        assert!(service.get("b").await.unwrap().is_some());
    }
}
