//! Migration from the key-value layout to the indexed store
//!
//! Runs on every start before any other store access. Galleries found under
//! the legacy listing are copied into the target store one document at a
//! time, then the listing and the documents it named are removed. Unexpired cached images
//! are carried over the same way. A second run finds nothing and does
//! nothing.

use crate::config::CACHE_EXPIRY_MS;
use crate::error::{AppError, Result};
use crate::storage::{now_ms, CacheStore, GalleryStore, KvCacheStore, KvGalleryStore, KvStore};
use serde::Serialize;
use std::sync::Arc;

/// What a migration run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub galleries_migrated: usize,
    pub images_migrated: usize,
    /// Missing or corrupt galleries, and corrupt or expired images
    pub skipped: usize,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone)]
pub struct MigrationService {
    legacy: KvStore,
    galleries: Arc<dyn GalleryStore>,
    cache: Option<Arc<dyn CacheStore>>,
    cache_expiry_ms: i64,
}

impl MigrationService {
    pub fn new(legacy: KvStore, galleries: Arc<dyn GalleryStore>) -> Self {
        Self {
            legacy,
            galleries,
            cache: None,
            cache_expiry_ms: CACHE_EXPIRY_MS,
        }
    }

    /// Also carry cached images over into `cache`
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>, cache_expiry_ms: i64) -> Self {
        self.cache = Some(cache);
        self.cache_expiry_ms = cache_expiry_ms;
        self
    }

    pub async fn migrate(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        self.migrate_galleries(&mut report).await?;
        if let Some(cache) = &self.cache {
            self.migrate_cache(cache.as_ref(), &mut report).await?;
        }

        if report.is_empty() {
            tracing::debug!("No legacy data to migrate");
        } else {
            tracing::info!(
                "Migration complete: {} galleries, {} images, {} skipped",
                report.galleries_migrated,
                report.images_migrated,
                report.skipped
            );
        }
        Ok(report)
    }

    async fn migrate_galleries(&self, report: &mut MigrationReport) -> Result<()> {
        let legacy = KvGalleryStore::new(self.legacy.clone());
        if !legacy.has_listing().await {
            return Ok(());
        }

        let ids: Vec<String> = match legacy.list().await {
            Ok(listing) => listing.into_iter().map(|entry| entry.id).collect(),
            Err(AppError::Serialization(e)) => {
                tracing::warn!("Legacy listing is corrupt, migrating stored documents: {}", e);
                legacy.stored_ids().await
            }
            Err(e) => return Err(e),
        };
        tracing::info!("Migrating {} legacy galleries", ids.len());

        for id in &ids {
            match legacy.get(id).await {
                Ok(Some(mut doc)) => {
                    // Counts are recomputed; timestamps are kept as stored
                    doc.refresh_metadata();
                    self.galleries.save(&doc).await?;
                    report.galleries_migrated += 1;
                    tracing::debug!("Migrated gallery: {} ({})", doc.name, doc.id);
                }
                Ok(None) => {
                    tracing::warn!("Legacy listing names {} but its document is missing", id);
                    report.skipped += 1;
                }
                Err(AppError::Serialization(e)) => {
                    tracing::warn!("Skipping corrupt legacy gallery {}: {}", id, e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        // Only after every document is copied
        let removed = legacy.remove_keys(&ids).await?;
        tracing::info!("Removed {} legacy gallery keys", removed);
        Ok(())
    }

    async fn migrate_cache(&self, cache: &dyn CacheStore, report: &mut MigrationReport) -> Result<()> {
        // Expiry is checked here, not on read
        let legacy = KvCacheStore::new(self.legacy.clone(), i64::MAX);
        let entries = legacy.load_all().await?;
        if entries.is_empty() {
            return Ok(());
        }

        let now = now_ms();
        let mut cache_full = false;

        for (key, record) in entries {
            match record {
                Some(record) if !cache_full && !record.is_older_than(self.cache_expiry_ms, now) => {
                    match cache.put(&record).await {
                        Ok(()) => report.images_migrated += 1,
                        Err(e) if e.is_capacity() => {
                            tracing::warn!("Cache full during migration, dropping the rest: {}", e);
                            cache_full = true;
                            report.skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                _ => report.skipped += 1,
            }
            legacy.remove_entry(&key).await?;
        }

        Ok(())
    }
}
