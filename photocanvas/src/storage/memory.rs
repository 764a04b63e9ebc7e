//! In-memory stores for unit tests
//!
//! Both stores can be told to reject upcoming writes with `QuotaExceeded`,
//! which is how the remediation ladders are driven without a real quota.

use super::{eviction_count, CacheStore, GalleryStore};
use crate::database::{CachedImageRecord, GalleryDocument, GalleryListEntry};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn quota_error(what: &str) -> AppError {
    AppError::QuotaExceeded(format!("memory store rejected {}", what))
}

/// Take one scripted failure if any are left
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub struct MemoryCacheStore {
    records: Mutex<HashMap<String, CachedImageRecord>>,
    /// Reject puts once this many records are stored
    pub capacity: Option<usize>,
    pub fail_puts: AtomicUsize,
}

impl MemoryCacheStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CachedImageRecord>> {
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, record: &CachedImageRecord) -> Result<()> {
        if take_failure(&self.fail_puts) {
            return Err(quota_error("cache put"));
        }
        let mut records = self.records.lock().unwrap();
        if let Some(capacity) = self.capacity {
            if !records.contains_key(&record.id) && records.len() >= capacity {
                return Err(quota_error("cache put"));
            }
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn clear_expired_at(&self, max_age_ms: i64, now_ms: i64) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| !r.is_older_than(max_age_ms, now_ms));
        Ok((before - records.len()) as u64)
    }

    async fn clear_all(&self) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.lock().unwrap().len() as u64)
    }

    async fn evict_oldest(&self, fraction: f64) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let mut by_age: Vec<(i64, String)> = records
            .values()
            .map(|r| (r.timestamp, r.id.clone()))
            .collect();
        by_age.sort();

        let target = eviction_count(by_age.len() as u64, fraction) as usize;
        for (_, id) in by_age.into_iter().take(target) {
            records.remove(&id);
        }
        Ok(target as u64)
    }
}

#[derive(Default)]
pub struct MemoryGalleryStore {
    docs: Mutex<HashMap<String, GalleryDocument>>,
    pub fail_saves: AtomicUsize,
    /// Each save waits this long before storing
    pub save_delay: Option<Duration>,
    pub saves: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MemoryGalleryStore {
    pub fn failing(times: usize) -> Self {
        Self {
            fail_saves: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            save_delay: Some(delay),
            ..Self::default()
        }
    }
}

#[async_trait]
impl GalleryStore for MemoryGalleryStore {
    async fn save(&self, doc: &GalleryDocument) -> Result<()> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }

        let result = if take_failure(&self.fail_saves) {
            Err(quota_error("gallery save"))
        } else {
            self.docs
                .lock()
                .unwrap()
                .insert(doc.id.clone(), doc.clone());
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get(&self, id: &str) -> Result<Option<GalleryDocument>> {
        Ok(self.docs.lock().unwrap().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<GalleryListEntry>> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .values()
            .map(GalleryDocument::listing)
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.docs.lock().unwrap().remove(id).is_some())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.docs.lock().unwrap().len() as u64)
    }
}
