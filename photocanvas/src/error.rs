//! Error types for the photocanvas storage core
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized to the frontend.

use std::fmt;
use thiserror::Error;

/// A remediation step attempted after a write was rejected for lack of space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Deleted cache entries older than an age threshold.
    ClearExpiredCache,
    /// Deleted the oldest share of the remaining cache entries.
    EvictOldestCache,
    /// Emptied the image cache.
    ClearAllCache,
    /// Dropped optional fields from the document being saved.
    StripDocument,
}

impl fmt::Display for Remediation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Remediation::ClearExpiredCache => "clear expired cache",
            Remediation::EvictOldestCache => "evict oldest cache entries",
            Remediation::ClearAllCache => "clear all cache",
            Remediation::StripDocument => "strip document",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Storage full after remediation ({})", describe_steps(.steps))]
    StorageFull { steps: Vec<Remediation> },

    #[error("Store not ready: {0}")]
    NotReady(String),

    #[error("Invalid gallery: {0}")]
    InvalidGallery(String),

    #[error("{0}")]
    Generic(String),
}

fn describe_steps(steps: &[Remediation]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl AppError {
    /// SQLite primary result code for a full database (`SQLITE_FULL`).
    const SQLITE_FULL: &'static str = "13";

    /// Classify a raw sqlx error, turning quota exhaustion into `QuotaExceeded`.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let full_code = db_err.code().is_some_and(|code| code == Self::SQLITE_FULL);
            if full_code || db_err.message().contains("database or disk is full") {
                return AppError::QuotaExceeded(db_err.message().to_string());
            }
        }
        AppError::Database(err)
    }

    /// True for a write rejected for lack of space, escalated or not.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            AppError::QuotaExceeded(_) | AppError::StorageFull { .. }
        )
    }

    /// True only for the escalated condition the user has to act on.
    pub fn is_storage_full(&self) -> bool {
        matches!(self, AppError::StorageFull { .. })
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Decode(err.to_string())
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
