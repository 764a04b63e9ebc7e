//! Image processor
//!
//! Produces the display and thumbnail variants of an upload. Each variant
//! is downsized (never upscaled) so its longer side fits the cap, then
//! re-encoded as JPEG and returned as a data URL. Both variants are built
//! concurrently on the blocking thread pool.
//!
//! If either variant fails, the raw upload bytes are used for both.

use crate::config::{DISPLAY_MAX_DIMENSION, JPEG_QUALITY, THUMBNAIL_MAX_DIMENSION};
use crate::database::Dimensions;
use crate::error::{AppError, Result};
use crate::services::settings::ProcessingSettings;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, ImageReader};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Raw upload plus the identity fields used for the cache key
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub size: u64,
    /// Modification time in epoch milliseconds
    pub last_modified: i64,
    pub bytes: Arc<Vec<u8>>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, last_modified: i64, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            last_modified,
            bytes: Arc::new(bytes),
        }
    }

    /// Read a file from disk, taking name and mtime from the filesystem
    pub async fn from_path(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let bytes = tokio::fs::read(path).await?;

        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            size: metadata.len(),
            last_modified,
            bytes: Arc::new(bytes),
        })
    }
}

/// One encoded variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data_url: String,
    pub size: Dimensions,
}

/// Both variants of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub display: EncodedImage,
    pub thumbnail: EncodedImage,
    pub original_size: Dimensions,
    /// True when processing failed and the raw bytes were used
    pub fallback: bool,
}

/// Resize and encoding parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub display_max_dimension: u32,
    pub thumbnail_max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            display_max_dimension: DISPLAY_MAX_DIMENSION,
            thumbnail_max_dimension: THUMBNAIL_MAX_DIMENSION,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

impl From<&ProcessingSettings> for ProcessorConfig {
    fn from(settings: &ProcessingSettings) -> Self {
        Self {
            display_max_dimension: settings.display_max_dimension,
            thumbnail_max_dimension: settings.thumbnail_max_dimension,
            jpeg_quality: settings.jpeg_quality,
        }
    }
}

/// Size after fitting `original` inside a `max_dimension` square.
/// Images already inside the cap keep their size.
pub fn target_dimensions(original: Dimensions, max_dimension: u32) -> Dimensions {
    let Dimensions { width, height } = original;
    if width <= max_dimension && height <= max_dimension {
        return original;
    }

    let scale = |side: u32, longer: u32| -> u32 {
        let scaled = (f64::from(side) * f64::from(max_dimension) / f64::from(longer)).round();
        (scaled as u32).max(1)
    };

    if width >= height {
        Dimensions::new(max_dimension, scale(height, width))
    } else {
        Dimensions::new(scale(width, height), max_dimension)
    }
}

/// Read width and height from the image header without decoding pixels
pub fn read_dimensions(bytes: &[u8]) -> Result<Dimensions> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(Dimensions::new(width, height))
}

/// Decode, downsize to `max_dimension` and encode as a JPEG data URL
pub fn encode_variant(bytes: &[u8], max_dimension: u32, quality: u8) -> Result<EncodedImage> {
    let img = image::load_from_memory(bytes)?;
    let target = target_dimensions(Dimensions::new(img.width(), img.height()), max_dimension);

    let resized = if target.width != img.width() || target.height != img.height() {
        img.resize_exact(target.width, target.height, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = resized.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).write_image(
        &rgb,
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;

    Ok(EncodedImage {
        data_url: format!("data:image/jpeg;base64,{}", STANDARD.encode(&buffer)),
        size: target,
    })
}

/// The unprocessed upload as a data URL
pub fn raw_data_url(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Builds both variants of an upload
#[derive(Debug, Clone, Default)]
pub struct ImageProcessor {
    config: ProcessorConfig,
}

impl ImageProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    async fn variant(&self, bytes: Arc<Vec<u8>>, max_dimension: u32) -> Result<EncodedImage> {
        let quality = self.config.jpeg_quality;
        tokio::task::spawn_blocking(move || encode_variant(&bytes, max_dimension, quality))
            .await
            .map_err(|e| AppError::Generic(format!("Image processing task failed: {}", e)))?
    }

    /// Build both variants, propagating the first failure
    pub async fn try_process(&self, bytes: Arc<Vec<u8>>) -> Result<ProcessedImage> {
        let original_size = read_dimensions(&bytes)?;

        let (display, thumbnail) = tokio::join!(
            self.variant(bytes.clone(), self.config.display_max_dimension),
            self.variant(bytes, self.config.thumbnail_max_dimension),
        );

        Ok(ProcessedImage {
            display: display?,
            thumbnail: thumbnail?,
            original_size,
            fallback: false,
        })
    }

    /// Build both variants, falling back to the raw bytes on any failure
    pub async fn process(&self, file: &UploadedFile) -> ProcessedImage {
        match self.try_process(file.bytes.clone()).await {
            Ok(processed) => processed,
            Err(e) => {
                tracing::warn!("Processing {} failed, using original bytes: {}", file.name, e);

                let original_size = read_dimensions(&file.bytes).unwrap_or_default();
                let raw = EncodedImage {
                    data_url: raw_data_url(&file.bytes),
                    size: original_size,
                };
                ProcessedImage {
                    display: raw.clone(),
                    thumbnail: raw,
                    original_size,
                    fallback: true,
                }
            }
        }
    }
}
