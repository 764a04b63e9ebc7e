//! Gallery service
//!
//! Business logic over a [`GalleryStore`]: validation, metadata refresh and
//! the remediation ladder for saves rejected for lack of space.

use crate::config::{CACHE_EXPIRY_MS, STRIPPED_PHOTO_LIMIT};
use crate::database::{GalleryDocument, GalleryListEntry};
use crate::error::{AppError, Remediation, Result};
use crate::storage::{CacheStore, GalleryStore};
use chrono::Utc;
use std::sync::Arc;

/// A successful save and what it took to get there
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// The document as stored, possibly stripped
    pub document: GalleryDocument,
    pub steps: Vec<Remediation>,
}

impl SaveOutcome {
    pub fn was_stripped(&self) -> bool {
        self.steps.contains(&Remediation::StripDocument)
    }
}

#[derive(Clone)]
pub struct GalleryService {
    store: Arc<dyn GalleryStore>,
    cache: Arc<dyn CacheStore>,
    cache_expiry_ms: i64,
}

impl GalleryService {
    pub fn new(store: Arc<dyn GalleryStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            cache,
            cache_expiry_ms: CACHE_EXPIRY_MS,
        }
    }

    pub fn with_cache_expiry(mut self, cache_expiry_ms: i64) -> Self {
        self.cache_expiry_ms = cache_expiry_ms;
        self
    }

    /// Create and save an empty gallery
    pub async fn create(&self, name: &str, description: Option<String>) -> Result<GalleryDocument> {
        let name = validate_name(name)?;
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let doc = GalleryDocument::new(name, description);
        let outcome = self.save(&doc).await?;

        tracing::info!("Created gallery: {} ({})", outcome.document.name, outcome.document.id);
        Ok(outcome.document)
    }

    /// Save a document, recomputing its metadata and update time.
    ///
    /// On a capacity failure the ladder clears expired cache entries, then
    /// the whole cache, then strips the document, retrying after each step.
    pub async fn save(&self, doc: &GalleryDocument) -> Result<SaveOutcome> {
        let mut document = doc.clone();
        document.refresh_metadata();
        document.updated_at = Utc::now();

        let mut steps = Vec::new();
        let err = match self.store.save(&document).await {
            Ok(()) => return Ok(SaveOutcome { document, steps }),
            Err(e) if e.is_capacity() => e,
            Err(e) => return Err(e),
        };
        tracing::warn!("Saving gallery {} hit the quota: {}", document.id, err);

        for step in [
            Remediation::ClearExpiredCache,
            Remediation::ClearAllCache,
            Remediation::StripDocument,
        ] {
            match step {
                Remediation::ClearExpiredCache => {
                    let removed = self.cache.clear_expired(self.cache_expiry_ms).await?;
                    tracing::info!("Cleared {} expired cache entries", removed);
                }
                Remediation::ClearAllCache => {
                    let removed = self.cache.clear_all().await?;
                    tracing::info!("Cleared {} cache entries", removed);
                }
                // Eviction belongs to the cache ladder
                Remediation::EvictOldestCache => continue,
                Remediation::StripDocument => {
                    let dropped = document.strip_for_quota(STRIPPED_PHOTO_LIMIT);
                    tracing::warn!(
                        "Stripped gallery {} to fit storage: thumbnails removed, {} photos dropped",
                        document.id,
                        dropped
                    );
                }
            }
            steps.push(step);

            match self.store.save(&document).await {
                Ok(()) => {
                    tracing::info!("Saved gallery {} after {}", document.id, step);
                    return Ok(SaveOutcome { document, steps });
                }
                Err(e) if e.is_capacity() => continue,
                Err(e) => return Err(e),
            }
        }

        tracing::error!("Gallery {} could not be saved after remediation", document.id);
        Err(AppError::StorageFull { steps })
    }

    pub async fn get(&self, id: &str) -> Result<Option<GalleryDocument>> {
        self.store.get(id).await
    }

    /// Listing entries, most recently updated first
    pub async fn list(&self) -> Result<Vec<GalleryListEntry>> {
        let mut entries = self.store.list().await?;
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }

    /// Delete a gallery. Missing ids are a no-op.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(id).await?;
        if removed {
            tracing::info!("Deleted gallery: {}", id);
        }
        Ok(removed)
    }

    /// Rename a gallery, returning the saved document
    pub async fn rename(&self, id: &str, name: &str) -> Result<GalleryDocument> {
        let name = validate_name(name)?;
        let mut doc = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::InvalidGallery(format!("no gallery with id {}", id)))?;

        doc.name = name;
        Ok(self.save(&doc).await?.document)
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidGallery("name is required".to_string()));
    }
    Ok(trimmed.to_string())
}
