//! Database module
//!
//! This module provides all database functionality including:
//! - The shared, lazily opened connection handle
//! - Schema and migrations
//! - Model definitions
//! - Repository layer for gallery and image cache collections

pub mod models;
pub mod repository;
pub mod schema;

pub use models::*;
pub use repository::Repository;
pub use schema::initialize_database;

use crate::error::{AppError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Default SQLite page size, used to turn a byte quota into `max_page_count`
const PAGE_SIZE: u64 = 4096;

/// Build connection options shared by migration and application connections.
fn connect_options(db_path: &Path) -> std::result::Result<SqliteConnectOptions, sqlx::Error> {
    SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display())).map(
        |opts| {
            opts.create_if_missing(true)
                .busy_timeout(Duration::from_secs(5))
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true)
        },
    )
}

/// Apply the byte quota as a page limit; writes past it fail with `SQLITE_FULL`.
fn with_quota(opts: SqliteConnectOptions, quota_bytes: Option<u64>) -> SqliteConnectOptions {
    match quota_bytes {
        Some(bytes) => {
            let pages = (bytes / PAGE_SIZE).max(1);
            opts.pragma("max_page_count", pages.to_string())
        }
        None => opts,
    }
}

#[derive(Debug, Clone)]
enum Target {
    File(PathBuf),
    Memory,
}

/// Bytes used by the database, and the quota when one is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseUsage {
    pub used_bytes: u64,
    pub quota_bytes: Option<u64>,
}

struct Inner {
    target: Target,
    quota_bytes: Option<u64>,
    pool: OnceCell<SqlitePool>,
    opens: AtomicUsize,
}

/// Shared database handle.
///
/// The connection pool is opened on first use. Callers that arrive while the
/// open is in progress wait for it instead of opening a second pool. Clones
/// share the same pool.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    /// Handle for a database file, opened lazily
    pub fn new(db_path: impl Into<PathBuf>, quota_bytes: Option<u64>) -> Self {
        Self::with_target(Target::File(db_path.into()), quota_bytes)
    }

    /// Handle for a private in-memory database (single connection)
    pub fn in_memory(quota_bytes: Option<u64>) -> Self {
        Self::with_target(Target::Memory, quota_bytes)
    }

    fn with_target(target: Target, quota_bytes: Option<u64>) -> Self {
        Self {
            inner: Arc::new(Inner {
                target,
                quota_bytes,
                pool: OnceCell::new(),
                opens: AtomicUsize::new(0),
            }),
        }
    }

    /// Get the pool, opening it on first call
    pub async fn pool(&self) -> Result<SqlitePool> {
        let pool = self
            .inner
            .pool
            .get_or_try_init(|| async { self.open().await })
            .await?;
        Ok(pool.clone())
    }

    /// Pool if it has already been opened
    pub fn try_pool(&self) -> Result<SqlitePool> {
        self.inner
            .pool
            .get()
            .cloned()
            .ok_or_else(|| AppError::NotReady("database connection not open".to_string()))
    }

    pub fn is_open(&self) -> bool {
        self.inner.pool.initialized()
    }

    /// Number of times a pool was actually opened
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn quota_bytes(&self) -> Option<u64> {
        self.inner.quota_bytes
    }

    async fn open(&self) -> Result<SqlitePool> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        match &self.inner.target {
            Target::File(path) => create_pool(path, self.inner.quota_bytes).await,
            Target::Memory => {
                tracing::info!("Opening in-memory database");
                let options = with_quota(
                    SqliteConnectOptions::from_str("sqlite::memory:")?,
                    self.inner.quota_bytes,
                );
                // An in-memory database lives and dies with its connection.
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None::<Duration>)
                    .max_lifetime(None::<Duration>)
                    .connect_with(options)
                    .await?;
                initialize_database(&pool).await?;
                Ok(pool)
            }
        }
    }

    /// Bytes currently used by live pages
    pub async fn usage(&self) -> Result<DatabaseUsage> {
        let pool = self.pool().await?;

        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&pool)
            .await?;
        let freelist: i64 = sqlx::query_scalar("PRAGMA freelist_count")
            .fetch_one(&pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&pool)
            .await?;

        let live_pages = u64::try_from(page_count - freelist).unwrap_or_default();
        let page_size = u64::try_from(page_size).unwrap_or(PAGE_SIZE);

        Ok(DatabaseUsage {
            used_bytes: live_pages * page_size,
            quota_bytes: self.inner.quota_bytes,
        })
    }

    /// Close the pool if it was opened
    pub async fn close(&self) {
        if let Some(pool) = self.inner.pool.get() {
            pool.close().await;
            tracing::info!("Database pool closed");
        }
    }
}

/// Create and initialize a database connection pool.
///
/// Migrations run on a dedicated single-connection pool that is closed
/// before the application pool is created, so every application connection
/// sees the final schema. The quota only applies to application connections.
pub async fn create_pool(db_path: &Path, quota_bytes: Option<u64>) -> Result<SqlitePool> {
    tracing::info!("Creating database connection pool at: {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let migration_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(db_path)?)
        .await?;

    initialize_database(&migration_pool).await?;
    migration_pool.close().await;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(with_quota(connect_options(db_path)?, quota_bytes))
        .await?;

    tracing::info!("Database pool created successfully");

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lazy_open() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("test.sqlite"), None);

        assert!(!db.is_open());
        assert!(matches!(db.try_pool(), Err(AppError::NotReady(_))));

        db.pool().await.unwrap();
        assert!(db.is_open());
        assert!(db.try_pool().is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_open() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("test.sqlite"), None);

        let other = db.clone();
        let (a, b, c) = tokio::join!(db.pool(), other.pool(), db.pool());
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert_eq!(db.open_count(), 1);
    }

    #[tokio::test]
    async fn test_usage_reports_quota() {
        let db = Database::in_memory(Some(1024 * 1024));
        let usage = db.usage().await.unwrap();

        assert!(usage.used_bytes > 0);
        assert_eq!(usage.quota_bytes, Some(1024 * 1024));
    }

    #[tokio::test]
    async fn test_quota_sets_max_page_count() {
        let db = Database::in_memory(Some(64 * PAGE_SIZE));
        let pool = db.pool().await.unwrap();

        let max_pages: i64 = sqlx::query_scalar("PRAGMA max_page_count")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(max_pages, 64);
    }
}
