//! Application configuration constants
//!
//! Central location for all configuration constants, resource limits,
//! and validation boundaries used throughout the storage core.

// ===== Image Processing =====

/// Longest side of the display variant in pixels
pub const DISPLAY_MAX_DIMENSION: u32 = 2048;

/// Longest side of the thumbnail variant in pixels
pub const THUMBNAIL_MAX_DIMENSION: u32 = 200;

/// Lossy encoding quality for both variants (percent)
pub const JPEG_QUALITY: u8 = 90;

/// Lowest accepted encoding quality in settings
pub const MIN_JPEG_QUALITY: u8 = 10;

/// Smallest accepted cap for either variant.
/// Anything below this produces unusable previews.
pub const MIN_VARIANT_DIMENSION: u32 = 16;

/// Largest accepted cap for either variant
pub const MAX_VARIANT_DIMENSION: u32 = 8192;

// ===== Image Cache =====

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Records older than this are expired (7 days)
pub const CACHE_EXPIRY_MS: i64 = 7 * DAY_MS;

/// Tightened threshold used when a write hits the quota (3 days)
pub const PRESSURE_EXPIRY_MS: i64 = 3 * DAY_MS;

/// Share of remaining cache entries dropped by aggressive eviction
pub const AGGRESSIVE_EVICTION_FRACTION: f64 = 0.5;

/// Maximum expiry window accepted in settings (days)
pub const MAX_CACHE_EXPIRY_DAYS: u32 = 365;

// ===== Galleries =====

/// Photos kept when a gallery is stripped to fit the quota
pub const STRIPPED_PHOTO_LIMIT: usize = 20;

/// Smallest display size a placed photo can be set to (pixels)
pub const MIN_IMAGE_SIZE: u32 = 50;

/// Largest display size a placed photo can be set to (pixels)
pub const MAX_IMAGE_SIZE: u32 = 800;

/// Display size of placed photos in a fresh gallery (pixels)
pub const DEFAULT_IMAGE_SIZE: u32 = 200;

// ===== Auto-Save =====

/// Quiet period after the last edit before a save fires
pub const AUTO_SAVE_DEBOUNCE_MS: u64 = 1000;

/// Minimum auto-save delay in milliseconds.
/// Values below this cause a save per keystroke.
pub const MIN_AUTO_SAVE_DELAY_MS: u64 = 100;

/// Maximum auto-save delay in milliseconds (5 minutes).
/// Values above this risk data loss on unexpected shutdown.
pub const MAX_AUTO_SAVE_DELAY_MS: u64 = 300_000;

// ===== Legacy Key-Value Layout =====

/// Key holding the legacy gallery listing
pub const LEGACY_LISTING_KEY: &str = "photoGalleries";

/// Prefix of legacy full gallery documents
pub const LEGACY_GALLERY_PREFIX: &str = "gallery_";

/// Prefix of legacy cached image records
pub const LEGACY_CACHE_PREFIX: &str = "image_cache_";

// ===== Data Directory Layout =====

/// SQLite database file inside the data directory
pub const DATABASE_FILE: &str = "photocanvas.sqlite";

/// Key-value store directory inside the data directory
pub const KV_STORE_DIR: &str = "kv";

/// Settings file inside the data directory
pub const SETTINGS_FILE: &str = "settings.json";
