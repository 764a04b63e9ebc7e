//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All stores and services are initialized here and made available through
//! AppState. The legacy migration runs before anything else touches a store.

use crate::config::{DATABASE_FILE, KV_STORE_DIR};
use crate::database::Database;
use crate::error::Result;
use crate::services::{
    AppSettings, AutoSaver, GalleryService, ImageCacheService, ImageProcessor, ImageService,
    MigrationReport, MigrationService, ProcessorConfig, SettingsService, StorageAccounting,
    StorageBackend,
};
use crate::storage::{
    CacheStore, GalleryStore, IndexedCacheStore, IndexedGalleryStore, KvCacheStore,
    KvGalleryStore, KvStore, QuotaEstimator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub app_data_dir: PathBuf,
    pub settings: AppSettings,
    pub settings_service: SettingsService,
    pub database: Database,
    pub kv: KvStore,
    pub cache_store: Arc<dyn CacheStore>,
    pub galleries: GalleryService,
    pub images: ImageService,
    pub accounting: StorageAccounting,
    /// What the startup migration did
    pub migration: MigrationReport,
}

impl AppState {
    /// Load settings, open the configured stores and run the migration
    pub async fn initialize(app_data_dir: &Path) -> Result<Self> {
        tracing::info!("Initializing application at {:?}", app_data_dir);

        tokio::fs::create_dir_all(app_data_dir).await?;

        let settings_service = SettingsService::new(app_data_dir.to_path_buf());
        let settings = settings_service.load().await?;
        let quota = settings.storage.quota_bytes;
        let expiry_ms = settings.cache.expiry_ms();

        let kv = KvStore::new(app_data_dir.join(KV_STORE_DIR), quota);
        kv.initialize().await?;

        // Opened on first use; never opened with the key-value backend
        let database = Database::new(app_data_dir.join(DATABASE_FILE), quota);

        let (cache_store, gallery_store, estimator, migration): (
            Arc<dyn CacheStore>,
            Arc<dyn GalleryStore>,
            Arc<dyn QuotaEstimator>,
            MigrationReport,
        ) = match settings.storage.backend {
            StorageBackend::Indexed => {
                let cache: Arc<dyn CacheStore> = Arc::new(IndexedCacheStore::new(database.clone()));
                let galleries: Arc<dyn GalleryStore> =
                    Arc::new(IndexedGalleryStore::new(database.clone()));

                let report = MigrationService::new(kv.clone(), galleries.clone())
                    .with_cache(cache.clone(), expiry_ms)
                    .migrate()
                    .await?;

                let estimator: Arc<dyn QuotaEstimator> = Arc::new(database.clone());
                (cache, galleries, estimator, report)
            }
            StorageBackend::KeyValue => {
                tracing::info!("Using key-value storage backend");
                let cache: Arc<dyn CacheStore> = Arc::new(KvCacheStore::new(kv.clone(), expiry_ms));
                let galleries: Arc<dyn GalleryStore> = Arc::new(KvGalleryStore::new(kv.clone()));
                let estimator: Arc<dyn QuotaEstimator> = Arc::new(kv.clone());
                (cache, galleries, estimator, MigrationReport::default())
            }
        };

        let cache_service = ImageCacheService::new(cache_store.clone())
            .with_pressure_expiry(settings.cache.pressure_expiry_ms());
        let processor = ImageProcessor::new(ProcessorConfig::from(&settings.processing));
        let images = ImageService::new(processor, cache_service);
        let galleries = GalleryService::new(gallery_store.clone(), cache_store.clone())
            .with_cache_expiry(expiry_ms);
        let accounting = StorageAccounting::new(estimator, cache_store.clone(), gallery_store);

        tracing::info!("Application initialized successfully");

        Ok(Self {
            app_data_dir: app_data_dir.to_path_buf(),
            settings,
            settings_service,
            database,
            kv,
            cache_store,
            galleries,
            images,
            accounting,
            migration,
        })
    }

    /// Debounced saver using the configured quiet period
    pub fn auto_saver(&self) -> AutoSaver {
        AutoSaver::with_delay(
            self.galleries.clone(),
            Duration::from_millis(self.settings.behavior.auto_save_delay_ms),
        )
    }

    /// Run the migration again; a no-op once legacy data is gone
    pub async fn migrate(&self) -> Result<MigrationReport> {
        match self.settings.storage.backend {
            StorageBackend::Indexed => {
                let galleries: Arc<dyn GalleryStore> =
                    Arc::new(IndexedGalleryStore::new(self.database.clone()));
                MigrationService::new(self.kv.clone(), galleries)
                    .with_cache(self.cache_store.clone(), self.settings.cache.expiry_ms())
                    .migrate()
                    .await
            }
            StorageBackend::KeyValue => Ok(MigrationReport::default()),
        }
    }

    /// Close the database if it was opened
    pub async fn close(&self) {
        self.database.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::GalleryDocument;
    use crate::services::settings::StorageSettings;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_initialize_indexed_backend() {
        let temp = TempDir::new().unwrap();

        let state = AppState::initialize(temp.path()).await.unwrap();
        assert!(state.migration.is_empty());

        state.galleries.create("Trip", None).await.unwrap();
        assert_eq!(state.galleries.list().await.unwrap().len(), 1);
        assert!(temp.path().join(DATABASE_FILE).exists());
        assert_eq!(state.database.open_count(), 1);
        state.close().await;
    }

    #[tokio::test]
    async fn test_initialize_migrates_legacy_data() {
        let temp = TempDir::new().unwrap();

        let kv = KvStore::new(temp.path().join(KV_STORE_DIR), None);
        kv.initialize().await.unwrap();
        let legacy = KvGalleryStore::new(kv);
        legacy
            .save(&GalleryDocument::new("Old", None))
            .await
            .unwrap();

        let state = AppState::initialize(temp.path()).await.unwrap();
        assert_eq!(state.migration.galleries_migrated, 1);
        assert_eq!(state.galleries.list().await.unwrap()[0].name, "Old");
        assert!(state.migrate().await.unwrap().is_empty());
        state.close().await;
    }

    #[tokio::test]
    async fn test_key_value_backend_never_opens_database() {
        let temp = TempDir::new().unwrap();
        SettingsService::new(temp.path().to_path_buf())
            .update_storage(StorageSettings {
                backend: StorageBackend::KeyValue,
                quota_bytes: None,
            })
            .await
            .unwrap();

        let state = AppState::initialize(temp.path()).await.unwrap();
        state.galleries.create("Trip", None).await.unwrap();

        let usage = state.accounting.usage().await;
        assert_eq!(usage.gallery_count, 1);
        assert!(usage.used_bytes > 0);
        assert!(!state.database.is_open());
    }
}
