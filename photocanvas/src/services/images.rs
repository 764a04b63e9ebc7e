//! Image import service
//!
//! Turns uploads into cached image records. The cache is read through on
//! the way in and written through after processing, so the same file
//! (same name, size and mtime) is only ever processed once.

use crate::database::CachedImageRecord;
use crate::error::{AppError, Result};
use crate::services::cache::ImageCacheService;
use crate::services::processor::{ImageProcessor, UploadedFile};
use crate::storage::{derive_cache_key, now_ms};

/// Result of importing one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedImage {
    pub record: CachedImageRecord,
    /// Served from the cache without processing
    pub from_cache: bool,
    /// Processing failed and the record holds the raw bytes
    pub fallback: bool,
}

#[derive(Clone)]
pub struct ImageService {
    processor: ImageProcessor,
    cache: ImageCacheService,
}

impl ImageService {
    pub fn new(processor: ImageProcessor, cache: ImageCacheService) -> Self {
        Self { processor, cache }
    }

    pub fn cache(&self) -> &ImageCacheService {
        &self.cache
    }

    /// Import one upload
    pub async fn import(&self, file: &UploadedFile) -> Result<ImportedImage> {
        let key = derive_cache_key(&file.name, file.size, file.last_modified);

        if let Some(record) = self.cache.get(&key).await? {
            tracing::debug!("Cache hit for {} ({})", file.name, key);
            return Ok(ImportedImage {
                record,
                from_cache: true,
                fallback: false,
            });
        }

        let processed = self.processor.process(file).await;
        let record = CachedImageRecord {
            id: key,
            original_name: file.name.clone(),
            processed_url: processed.display.data_url,
            thumbnail_url: processed.thumbnail.data_url,
            original_size: processed.original_size,
            processed_size: processed.display.size,
            file_size: file.size,
            timestamp: now_ms(),
        };

        // Raw fallbacks are not cached so a later upload gets another try
        if !processed.fallback {
            let steps = self.cache.put(&record).await?;
            if !steps.is_empty() {
                tracing::info!("Cached {} after {} cleanup steps", file.name, steps.len());
            }
        }

        tracing::info!(
            "Imported {} ({}x{} -> {}x{})",
            file.name,
            record.original_size.width,
            record.original_size.height,
            record.processed_size.width,
            record.processed_size.height
        );

        Ok(ImportedImage {
            record,
            from_cache: false,
            fallback: processed.fallback,
        })
    }

    /// Import several uploads concurrently.
    ///
    /// Results come back in input order. A file that fails to process falls
    /// back on its own without affecting the others.
    pub async fn import_batch(&self, files: Vec<UploadedFile>) -> Vec<Result<ImportedImage>> {
        let handles: Vec<_> = files
            .into_iter()
            .map(|file| {
                let service = self.clone();
                tokio::spawn(async move { service.import(&file).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(AppError::Generic(format!("Import task failed: {}", e))),
            });
        }
        results
    }
}
