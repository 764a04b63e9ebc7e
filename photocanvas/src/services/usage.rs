//! Storage accounting
//!
//! Best-effort usage report for display. Anything the backend cannot
//! report comes back as zero instead of an error. Counts are taken from
//! the stores at query time.

use crate::storage::{CacheStore, GalleryStore, QuotaEstimator};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub used_bytes: u64,
    /// Zero when no quota is known
    pub available_bytes: u64,
    pub cache_entry_count: u64,
    pub gallery_count: u64,
}

#[derive(Clone)]
pub struct StorageAccounting {
    estimator: Arc<dyn QuotaEstimator>,
    cache: Arc<dyn CacheStore>,
    galleries: Arc<dyn GalleryStore>,
}

impl StorageAccounting {
    pub fn new(
        estimator: Arc<dyn QuotaEstimator>,
        cache: Arc<dyn CacheStore>,
        galleries: Arc<dyn GalleryStore>,
    ) -> Self {
        Self {
            estimator,
            cache,
            galleries,
        }
    }

    pub async fn usage(&self) -> StorageUsage {
        let (used_bytes, available_bytes) = match self.estimator.estimate().await {
            Ok(estimate) => {
                let available = estimate
                    .quota_bytes
                    .map(|quota| quota.saturating_sub(estimate.used_bytes))
                    .unwrap_or(0);
                (estimate.used_bytes, available)
            }
            Err(e) => {
                tracing::debug!("Storage estimate unavailable: {}", e);
                (0, 0)
            }
        };

        let cache_entry_count = self.cache.count().await.unwrap_or_else(|e| {
            tracing::debug!("Cache count unavailable: {}", e);
            0
        });
        let gallery_count = self.galleries.count().await.unwrap_or_else(|e| {
            tracing::debug!("Gallery count unavailable: {}", e);
            0
        });

        StorageUsage {
            used_bytes,
            available_bytes,
            cache_entry_count,
            gallery_count,
        }
    }
}
