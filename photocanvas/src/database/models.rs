//! Database models
//!
//! Rust structs representing persisted entities.
//! All models use serde for serialization to the frontend and to the
//! legacy key-value layout, which uses camelCase field names.

use crate::config::{DEFAULT_IMAGE_SIZE, MAX_IMAGE_SIZE, MIN_IMAGE_SIZE};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Width/height pair in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn max_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// A processed upload, keyed by the identity of its source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedImageRecord {
    pub id: String,
    pub original_name: String,
    /// Display variant as a data URL
    pub processed_url: String,
    /// Thumbnail variant as a data URL
    pub thumbnail_url: String,
    pub original_size: Dimensions,
    pub processed_size: Dimensions,
    pub file_size: u64,
    /// Creation time in epoch milliseconds
    pub timestamp: i64,
}

impl CachedImageRecord {
    /// Strictly older than `max_age_ms` relative to `now_ms`; ties are kept.
    pub fn is_older_than(&self, max_age_ms: i64, now_ms: i64) -> bool {
        now_ms - self.timestamp > max_age_ms
    }
}

/// Flat row of the `image_cache` table
#[derive(Debug, Clone, FromRow)]
pub struct CachedImageRow {
    pub id: String,
    pub original_name: String,
    pub processed_url: String,
    pub thumbnail_url: String,
    pub original_width: i64,
    pub original_height: i64,
    pub processed_width: i64,
    pub processed_height: i64,
    pub file_size: i64,
    pub timestamp: i64,
}

fn column_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| AppError::Generic(format!("Invalid {} in image cache: {}", column, value)))
}

impl TryFrom<CachedImageRow> for CachedImageRecord {
    type Error = AppError;

    fn try_from(row: CachedImageRow) -> Result<Self> {
        Ok(Self {
            original_size: Dimensions::new(
                column_u32(row.original_width, "original_width")?,
                column_u32(row.original_height, "original_height")?,
            ),
            processed_size: Dimensions::new(
                column_u32(row.processed_width, "processed_width")?,
                column_u32(row.processed_height, "processed_height")?,
            ),
            file_size: u64::try_from(row.file_size).map_err(|_| {
                AppError::Generic(format!("Invalid file_size in image cache: {}", row.file_size))
            })?,
            id: row.id,
            original_name: row.original_name,
            processed_url: row.processed_url,
            thumbnail_url: row.thumbnail_url,
            timestamp: row.timestamp,
        })
    }
}

/// A photo placed on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedPhoto {
    pub id: String,
    /// Library entry this photo was placed from
    pub library_id: String,
    pub url: String,
    pub x: f64,
    pub y: f64,
}

/// An uploaded and processed image available for placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryImage {
    pub id: String,
    #[serde(default)]
    pub cache_id: Option<String>,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub size: Dimensions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GallerySettings {
    /// Display size applied to every placed photo
    pub image_size: u32,
}

impl Default for GallerySettings {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
        }
    }
}

/// Denormalized summary, recomputed on every save
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryMetadata {
    pub photo_count: usize,
    pub library_count: usize,
    #[serde(default)]
    pub preview_thumbnail: Option<String>,
}

/// A gallery with its placed photos and image library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub photos: Vec<PlacedPhoto>,
    #[serde(default)]
    pub image_library: Vec<LibraryImage>,
    #[serde(default)]
    pub settings: GallerySettings,
    #[serde(default)]
    pub metadata: GalleryMetadata,
}

impl GalleryDocument {
    /// Create an empty gallery with a fresh id
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description,
            created_at: now,
            updated_at: now,
            photos: Vec::new(),
            image_library: Vec::new(),
            settings: GallerySettings::default(),
            metadata: GalleryMetadata::default(),
        }
    }

    /// Recompute counts and the preview thumbnail from the current contents.
    /// Caller-supplied metadata is never trusted.
    pub fn refresh_metadata(&mut self) {
        let preview = self.photos.first().and_then(|photo| {
            self.image_library
                .iter()
                .find(|image| image.id == photo.library_id)
                .and_then(|image| image.thumbnail_url.clone())
        });

        self.metadata = GalleryMetadata {
            photo_count: self.photos.len(),
            library_count: self.image_library.len(),
            preview_thumbnail: preview,
        };
    }

    /// Add a processed image to the library, returning its library id.
    /// An image already present under the same cache id is reused.
    pub fn add_to_library(&mut self, record: &CachedImageRecord) -> String {
        if let Some(existing) = self
            .image_library
            .iter()
            .find(|image| image.cache_id.as_deref() == Some(record.id.as_str()))
        {
            return existing.id.clone();
        }

        let id = Uuid::new_v4().to_string();
        self.image_library.push(LibraryImage {
            id: id.clone(),
            cache_id: Some(record.id.clone()),
            name: record.original_name.clone(),
            url: record.processed_url.clone(),
            thumbnail_url: Some(record.thumbnail_url.clone()),
            size: record.processed_size,
        });
        id
    }

    /// Place a library image on the canvas, returning the new photo id
    pub fn place_photo(&mut self, library_id: &str, x: f64, y: f64) -> Option<String> {
        let url = self
            .image_library
            .iter()
            .find(|image| image.id == library_id)?
            .url
            .clone();

        let id = Uuid::new_v4().to_string();
        self.photos.push(PlacedPhoto {
            id: id.clone(),
            library_id: library_id.to_string(),
            url,
            x,
            y,
        });
        Some(id)
    }

    pub fn move_photo(&mut self, photo_id: &str, x: f64, y: f64) -> bool {
        match self.photos.iter_mut().find(|photo| photo.id == photo_id) {
            Some(photo) => {
                photo.x = x;
                photo.y = y;
                true
            }
            None => false,
        }
    }

    pub fn remove_photo(&mut self, photo_id: &str) -> bool {
        let before = self.photos.len();
        self.photos.retain(|photo| photo.id != photo_id);
        self.photos.len() != before
    }

    /// Set the uniform display size, clamped to the UI bounds
    pub fn set_image_size(&mut self, size: u32) {
        self.settings.image_size = size.clamp(MIN_IMAGE_SIZE, MAX_IMAGE_SIZE);
    }

    /// Drop optional payloads so the document fits a full store.
    ///
    /// Removes library thumbnails and the preview thumbnail and keeps only
    /// the first `photo_limit` placed photos. Returns the number of photos
    /// dropped.
    pub fn strip_for_quota(&mut self, photo_limit: usize) -> usize {
        for image in &mut self.image_library {
            image.thumbnail_url = None;
        }
        self.metadata.preview_thumbnail = None;

        let dropped = self.photos.len().saturating_sub(photo_limit);
        self.photos.truncate(photo_limit);
        self.metadata.photo_count = self.photos.len();
        self.metadata.library_count = self.image_library.len();
        dropped
    }

    /// Listing projection of this document
    pub fn listing(&self) -> GalleryListEntry {
        GalleryListEntry {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            metadata: self.metadata.clone(),
        }
    }
}

/// Metadata-only view of a gallery, used for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryListEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: GalleryMetadata,
}

/// Flat row of the `gallery_list` table
#[derive(Debug, Clone, FromRow)]
pub struct GalleryListRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub photo_count: i64,
    pub library_count: i64,
    pub preview_thumbnail: Option<String>,
}

impl From<GalleryListRow> for GalleryListEntry {
    fn from(row: GalleryListRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            metadata: GalleryMetadata {
                photo_count: usize::try_from(row.photo_count).unwrap_or_default(),
                library_count: usize::try_from(row.library_count).unwrap_or_default(),
                preview_thumbnail: row.preview_thumbnail,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> CachedImageRecord {
        CachedImageRecord {
            id: id.to_string(),
            original_name: "beach.jpg".to_string(),
            processed_url: "data:image/jpeg;base64,AAAA".to_string(),
            thumbnail_url: "data:image/jpeg;base64,BBBB".to_string(),
            original_size: Dimensions::new(4000, 3000),
            processed_size: Dimensions::new(2048, 1536),
            file_size: 1024,
            timestamp: 0,
        }
    }

    #[test]
    fn test_expiry_boundary_keeps_ties() {
        let mut rec = record("a");
        let now = 10_000;

        rec.timestamp = now - 1000;
        assert!(!rec.is_older_than(1000, now));

        rec.timestamp = now - 1001;
        assert!(rec.is_older_than(1000, now));

        rec.timestamp = now - 999;
        assert!(!rec.is_older_than(1000, now));
    }

    #[test]
    fn test_add_to_library_reuses_cache_id() {
        let mut doc = GalleryDocument::new("Trip", None);
        let first = doc.add_to_library(&record("abc"));
        let second = doc.add_to_library(&record("abc"));

        assert_eq!(first, second);
        assert_eq!(doc.image_library.len(), 1);
    }

    #[test]
    fn test_place_photo_copies_processed_url() {
        let mut doc = GalleryDocument::new("Trip", None);
        let library_id = doc.add_to_library(&record("abc"));

        let photo_id = doc.place_photo(&library_id, 10.0, 10.0).unwrap();
        assert_eq!(doc.photos.len(), 1);
        assert_eq!(doc.photos[0].id, photo_id);
        assert_eq!(doc.photos[0].url, "data:image/jpeg;base64,AAAA");
        assert_eq!((doc.photos[0].x, doc.photos[0].y), (10.0, 10.0));

        assert!(doc.place_photo("missing", 0.0, 0.0).is_none());
    }

    #[test]
    fn test_refresh_metadata_ignores_caller_counts() {
        let mut doc = GalleryDocument::new("Trip", None);
        let library_id = doc.add_to_library(&record("abc"));
        doc.place_photo(&library_id, 1.0, 2.0);
        doc.metadata.photo_count = 99;
        doc.metadata.library_count = 42;

        doc.refresh_metadata();

        assert_eq!(doc.metadata.photo_count, 1);
        assert_eq!(doc.metadata.library_count, 1);
        assert_eq!(
            doc.metadata.preview_thumbnail.as_deref(),
            Some("data:image/jpeg;base64,BBBB")
        );
    }

    #[test]
    fn test_strip_for_quota() {
        let mut doc = GalleryDocument::new("Trip", None);
        let library_id = doc.add_to_library(&record("abc"));
        for i in 0..25 {
            doc.place_photo(&library_id, i as f64, 0.0);
        }
        doc.refresh_metadata();

        let dropped = doc.strip_for_quota(20);

        assert_eq!(dropped, 5);
        assert_eq!(doc.photos.len(), 20);
        assert_eq!(doc.metadata.photo_count, 20);
        assert!(doc.metadata.preview_thumbnail.is_none());
        assert!(doc.image_library.iter().all(|i| i.thumbnail_url.is_none()));
    }

    #[test]
    fn test_image_size_is_clamped() {
        let mut doc = GalleryDocument::new("Trip", None);
        doc.set_image_size(5);
        assert_eq!(doc.settings.image_size, MIN_IMAGE_SIZE);
        doc.set_image_size(10_000);
        assert_eq!(doc.settings.image_size, MAX_IMAGE_SIZE);
        doc.set_image_size(300);
        assert_eq!(doc.settings.image_size, 300);
    }

    #[test]
    fn test_legacy_json_with_string_dates_parses() {
        let json = r#"{
            "id": "g1",
            "name": "Legacy",
            "createdAt": "2024-03-01T10:00:00.000Z",
            "updatedAt": "2024-03-02T11:30:00.000Z",
            "photos": [],
            "imageLibrary": [],
            "settings": { "imageSize": 250 },
            "metadata": { "photoCount": 0, "libraryCount": 0 }
        }"#;

        let doc: GalleryDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.name, "Legacy");
        assert_eq!(doc.settings.image_size, 250);
        assert_eq!(doc.created_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert!(doc.description.is_none());
    }
}
