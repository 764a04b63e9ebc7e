//! Settings service
//!
//! Manages application settings persistence using JSON file storage.

use crate::config::{
    AUTO_SAVE_DEBOUNCE_MS, CACHE_EXPIRY_MS, DISPLAY_MAX_DIMENSION, JPEG_QUALITY,
    MAX_AUTO_SAVE_DELAY_MS, MAX_CACHE_EXPIRY_DAYS, MAX_VARIANT_DIMENSION, MIN_AUTO_SAVE_DELAY_MS,
    MIN_JPEG_QUALITY, MIN_VARIANT_DIMENSION, PRESSURE_EXPIRY_MS, SETTINGS_FILE,
    THUMBNAIL_MAX_DIMENSION,
};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Which store generation holds galleries and the image cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SQLite tables with transactional gallery writes
    #[default]
    Indexed,
    /// One file per key, the legacy layout
    KeyValue,
}

/// Storage backend and quota
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Byte budget; `None` means the host reports no quota
    #[serde(default)]
    pub quota_bytes: Option<u64>,
}

/// Image cache expiry windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_expiry_days")]
    pub expiry_days: u32,
    /// Tightened window used when a write hits the quota
    #[serde(default = "default_pressure_expiry_days")]
    pub pressure_expiry_days: u32,
}

fn default_expiry_days() -> u32 {
    (CACHE_EXPIRY_MS / DAY_MS) as u32
}

fn default_pressure_expiry_days() -> u32 {
    (PRESSURE_EXPIRY_MS / DAY_MS) as u32
}

impl CacheSettings {
    pub fn expiry_ms(&self) -> i64 {
        i64::from(self.expiry_days) * DAY_MS
    }

    pub fn pressure_expiry_ms(&self) -> i64 {
        i64::from(self.pressure_expiry_days) * DAY_MS
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            expiry_days: default_expiry_days(),
            pressure_expiry_days: default_pressure_expiry_days(),
        }
    }
}

/// Resize caps and encoder quality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingSettings {
    #[serde(default = "default_display_max_dimension")]
    pub display_max_dimension: u32,
    #[serde(default = "default_thumbnail_max_dimension")]
    pub thumbnail_max_dimension: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_display_max_dimension() -> u32 {
    DISPLAY_MAX_DIMENSION
}

fn default_thumbnail_max_dimension() -> u32 {
    THUMBNAIL_MAX_DIMENSION
}

fn default_jpeg_quality() -> u8 {
    JPEG_QUALITY
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            display_max_dimension: default_display_max_dimension(),
            thumbnail_max_dimension: default_thumbnail_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Auto-save behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorSettings {
    /// Quiet period before an edit is saved (milliseconds)
    #[serde(default = "default_auto_save_delay")]
    pub auto_save_delay_ms: u64,
}

fn default_auto_save_delay() -> u64 {
    AUTO_SAVE_DEBOUNCE_MS
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            auto_save_delay_ms: default_auto_save_delay(),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AppSettings {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub processing: ProcessingSettings,
    #[serde(default)]
    pub behavior: BehaviorSettings,
}

impl AppSettings {
    /// Reject values outside the supported bounds
    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        if cache.expiry_days == 0 || cache.expiry_days > MAX_CACHE_EXPIRY_DAYS {
            return Err(AppError::Generic(format!(
                "cache.expiry_days must be between 1 and {}",
                MAX_CACHE_EXPIRY_DAYS
            )));
        }
        if cache.pressure_expiry_days == 0 || cache.pressure_expiry_days > cache.expiry_days {
            return Err(AppError::Generic(
                "cache.pressure_expiry_days must be between 1 and cache.expiry_days".to_string(),
            ));
        }

        let processing = &self.processing;
        for (name, value) in [
            ("display_max_dimension", processing.display_max_dimension),
            ("thumbnail_max_dimension", processing.thumbnail_max_dimension),
        ] {
            if !(MIN_VARIANT_DIMENSION..=MAX_VARIANT_DIMENSION).contains(&value) {
                return Err(AppError::Generic(format!(
                    "processing.{} must be between {} and {}",
                    name, MIN_VARIANT_DIMENSION, MAX_VARIANT_DIMENSION
                )));
            }
        }
        if processing.thumbnail_max_dimension > processing.display_max_dimension {
            return Err(AppError::Generic(
                "processing.thumbnail_max_dimension cannot exceed display_max_dimension"
                    .to_string(),
            ));
        }
        if !(MIN_JPEG_QUALITY..=100).contains(&processing.jpeg_quality) {
            return Err(AppError::Generic(format!(
                "processing.jpeg_quality must be between {} and 100",
                MIN_JPEG_QUALITY
            )));
        }

        let delay = self.behavior.auto_save_delay_ms;
        if !(MIN_AUTO_SAVE_DELAY_MS..=MAX_AUTO_SAVE_DELAY_MS).contains(&delay) {
            return Err(AppError::Generic(format!(
                "behavior.auto_save_delay_ms must be between {} and {}",
                MIN_AUTO_SAVE_DELAY_MS, MAX_AUTO_SAVE_DELAY_MS
            )));
        }

        if self.storage.quota_bytes == Some(0) {
            return Err(AppError::Generic(
                "storage.quota_bytes must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Service for managing application settings
#[derive(Clone)]
pub struct SettingsService {
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new(app_data_dir: PathBuf) -> Self {
        Self {
            settings_path: app_data_dir.join(SETTINGS_FILE),
        }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<AppSettings> {
        if !self.settings_path.exists() {
            tracing::info!("Settings file not found, creating default settings");
            let default = AppSettings::default();
            self.save(&default).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(&self.settings_path).await?;
        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Generic(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;

        Ok(settings)
    }

    /// Validate and save settings to disk
    pub async fn save(&self, settings: &AppSettings) -> Result<()> {
        settings.validate()?;

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| AppError::Generic(format!("Failed to serialize settings: {}", e)))?;

        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.settings_path, content).await?;
        tracing::info!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }

    /// Update storage settings; takes effect on next start
    pub async fn update_storage(&self, storage: StorageSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.storage = storage;
        self.save(&settings).await
    }

    /// Update cache expiry settings
    pub async fn update_cache(&self, cache: CacheSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.cache = cache;
        self.save(&settings).await
    }

    /// Update processing settings
    pub async fn update_processing(&self, processing: ProcessingSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.processing = processing;
        self.save(&settings).await
    }

    /// Update behavior settings (auto-save delay)
    pub async fn update_behavior(&self, behavior: BehaviorSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.behavior = behavior;
        self.save(&settings).await
    }
}
