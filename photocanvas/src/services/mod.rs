//! Services module
//!
//! Business logic services that coordinate between callers and the stores.

pub mod autosave;
pub mod cache;
pub mod galleries;
pub mod images;
pub mod migration;
pub mod processor;
pub mod settings;
pub mod usage;

pub use autosave::AutoSaver;
pub use cache::ImageCacheService;
pub use galleries::{GalleryService, SaveOutcome};
pub use images::{ImageService, ImportedImage};
pub use migration::{MigrationReport, MigrationService};
pub use processor::{ImageProcessor, ProcessorConfig, UploadedFile};
pub use settings::{AppSettings, SettingsService, StorageBackend};
pub use usage::{StorageAccounting, StorageUsage};
