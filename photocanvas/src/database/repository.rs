//! Repository layer for database operations
//!
//! This module provides CRUD operations for the gallery and image cache
//! collections. Every gallery write touches the document and its listing
//! row inside one transaction.

use super::models::*;
use crate::error::{AppError, Result};
use sqlx::SqlitePool;

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ===== Galleries =====

    /// Upsert a gallery document together with its listing row
    pub async fn save_gallery(&self, doc: &GalleryDocument) -> Result<()> {
        let document = serde_json::to_string(doc)?;
        let listing = doc.listing();

        let mut tx = self.pool.begin().await.map_err(AppError::from_sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO galleries (id, name, created_at, updated_at, document)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at,
                document = excluded.document
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.name)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .bind(&document)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from_sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO gallery_list (
                id, name, description, created_at, updated_at,
                photo_count, library_count, preview_thumbnail
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                updated_at = excluded.updated_at,
                photo_count = excluded.photo_count,
                library_count = excluded.library_count,
                preview_thumbnail = excluded.preview_thumbnail
            "#,
        )
        .bind(&listing.id)
        .bind(&listing.name)
        .bind(&listing.description)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .bind(listing.metadata.photo_count as i64)
        .bind(listing.metadata.library_count as i64)
        .bind(&listing.metadata.preview_thumbnail)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from_sqlx)?;

        tx.commit().await.map_err(AppError::from_sqlx)?;

        tracing::debug!("Saved gallery: {} ({} bytes)", doc.id, document.len());
        Ok(())
    }

    /// Get a gallery document by ID
    pub async fn get_gallery(&self, id: &str) -> Result<Option<GalleryDocument>> {
        let document: Option<String> =
            sqlx::query_scalar("SELECT document FROM galleries WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match document {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// List the listing projection of every gallery
    pub async fn list_galleries(&self) -> Result<Vec<GalleryListEntry>> {
        let rows = sqlx::query_as::<_, GalleryListRow>(
            r#"
            SELECT * FROM gallery_list
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(GalleryListEntry::from).collect())
    }

    /// Listing entries whose name matches exactly
    pub async fn find_galleries_by_name(&self, name: &str) -> Result<Vec<GalleryListEntry>> {
        let rows = sqlx::query_as::<_, GalleryListRow>(
            r#"
            SELECT gallery_list.* FROM gallery_list
            JOIN galleries ON galleries.id = gallery_list.id
            WHERE galleries.name = ?
            ORDER BY gallery_list.updated_at DESC
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(GalleryListEntry::from).collect())
    }

    /// Delete a gallery and its listing row. Missing ids are a no-op.
    pub async fn delete_gallery(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(AppError::from_sqlx)?;

        let removed = sqlx::query("DELETE FROM galleries WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from_sqlx)?
            .rows_affected();

        sqlx::query("DELETE FROM gallery_list WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from_sqlx)?;

        tx.commit().await.map_err(AppError::from_sqlx)?;

        if removed > 0 {
            tracing::debug!("Deleted gallery: {}", id);
        }
        Ok(removed > 0)
    }

    pub async fn count_galleries(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM galleries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    // ===== Image cache =====

    /// Get a cached image by key
    pub async fn get_cached_image(&self, id: &str) -> Result<Option<CachedImageRecord>> {
        let row = sqlx::query_as::<_, CachedImageRow>("SELECT * FROM image_cache WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CachedImageRecord::try_from).transpose()
    }

    /// Cached images produced from a file with this name
    pub async fn find_cached_by_name(&self, original_name: &str) -> Result<Vec<CachedImageRecord>> {
        let rows = sqlx::query_as::<_, CachedImageRow>(
            r#"
            SELECT * FROM image_cache
            WHERE original_name = ?
            ORDER BY timestamp DESC
            "#,
        )
        .bind(original_name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CachedImageRecord::try_from).collect()
    }

    /// Insert or overwrite a cached image
    pub async fn put_cached_image(&self, record: &CachedImageRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO image_cache (
                id, original_name, processed_url, thumbnail_url,
                original_width, original_height, processed_width, processed_height,
                file_size, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.original_name)
        .bind(&record.processed_url)
        .bind(&record.thumbnail_url)
        .bind(i64::from(record.original_size.width))
        .bind(i64::from(record.original_size.height))
        .bind(i64::from(record.processed_size.width))
        .bind(i64::from(record.processed_size.height))
        .bind(i64::try_from(record.file_size).unwrap_or(i64::MAX))
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(AppError::from_sqlx)?;

        tracing::debug!("Cached image: {}", record.id);
        Ok(())
    }

    pub async fn delete_cached_image(&self, id: &str) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM image_cache WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from_sqlx)?
            .rows_affected();
        Ok(rows > 0)
    }

    /// Delete every record with `timestamp < cutoff`, returning the count removed
    pub async fn delete_cached_before(&self, cutoff: i64) -> Result<u64> {
        let rows = sqlx::query("DELETE FROM image_cache WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(AppError::from_sqlx)?
            .rows_affected();
        Ok(rows)
    }

    /// Delete the `limit` oldest records, returning the count removed
    pub async fn delete_oldest_cached(&self, limit: u64) -> Result<u64> {
        if limit == 0 {
            return Ok(0);
        }

        let rows = sqlx::query(
            r#"
            DELETE FROM image_cache WHERE id IN (
                SELECT id FROM image_cache ORDER BY timestamp ASC, id ASC LIMIT ?
            )
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(AppError::from_sqlx)?
        .rows_affected();
        Ok(rows)
    }

    pub async fn clear_cached_images(&self) -> Result<u64> {
        let rows = sqlx::query("DELETE FROM image_cache")
            .execute(&self.pool)
            .await
            .map_err(AppError::from_sqlx)?
            .rows_affected();
        Ok(rows)
    }

    pub async fn count_cached_images(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM image_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    async fn create_test_repo() -> Repository {
        let db = Database::in_memory(None);
        Repository::new(db.pool().await.unwrap())
    }

    fn cached(id: &str, timestamp: i64) -> CachedImageRecord {
        CachedImageRecord {
            id: id.to_string(),
            original_name: format!("{}.jpg", id),
            processed_url: "data:image/jpeg;base64,AAAA".to_string(),
            thumbnail_url: "data:image/jpeg;base64,BBBB".to_string(),
            original_size: Dimensions::new(4000, 3000),
            processed_size: Dimensions::new(2048, 1536),
            file_size: 2_500_000,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_save_and_get_gallery() {
        let repo = create_test_repo().await;

        let mut doc = GalleryDocument::new("Trip", Some("Summer".to_string()));
        let library_id = doc.add_to_library(&cached("abc", 1));
        doc.place_photo(&library_id, 10.0, 10.0);
        doc.refresh_metadata();

        repo.save_gallery(&doc).await.unwrap();

        let fetched = repo.get_gallery(&doc.id).await.unwrap().unwrap();
        assert_eq!(fetched, doc);

        let listing = repo.list_galleries().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].metadata.photo_count, 1);
        assert_eq!(listing[0].description.as_deref(), Some("Summer"));
    }

    #[tokio::test]
    async fn test_save_overwrites_listing() {
        let repo = create_test_repo().await;

        let mut doc = GalleryDocument::new("Trip", None);
        repo.save_gallery(&doc).await.unwrap();

        doc.name = "Road Trip".to_string();
        let library_id = doc.add_to_library(&cached("abc", 1));
        doc.place_photo(&library_id, 0.0, 0.0);
        doc.place_photo(&library_id, 5.0, 5.0);
        doc.refresh_metadata();
        repo.save_gallery(&doc).await.unwrap();

        let listing = repo.list_galleries().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "Road Trip");
        assert_eq!(listing[0].metadata.photo_count, 2);
        assert_eq!(repo.count_galleries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_gallery_is_none() {
        let repo = create_test_repo().await;
        assert!(repo.get_gallery("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_gallery_removes_both_rows() {
        let repo = create_test_repo().await;

        let doc = GalleryDocument::new("Trip", None);
        repo.save_gallery(&doc).await.unwrap();

        assert!(repo.delete_gallery(&doc.id).await.unwrap());
        assert!(repo.get_gallery(&doc.id).await.unwrap().is_none());
        assert!(repo.list_galleries().await.unwrap().is_empty());

        // Second delete is a silent no-op
        assert!(!repo.delete_gallery(&doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_galleries_by_name() {
        let repo = create_test_repo().await;

        repo.save_gallery(&GalleryDocument::new("Trip", None))
            .await
            .unwrap();
        repo.save_gallery(&GalleryDocument::new("Home", None))
            .await
            .unwrap();

        let found = repo.find_galleries_by_name("Home").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Home");
    }

    #[tokio::test]
    async fn test_cache_put_get_overwrite() {
        let repo = create_test_repo().await;

        repo.put_cached_image(&cached("k1", 100)).await.unwrap();
        let mut updated = cached("k1", 200);
        updated.processed_url = "data:image/jpeg;base64,CCCC".to_string();
        repo.put_cached_image(&updated).await.unwrap();

        let fetched = repo.get_cached_image("k1").await.unwrap().unwrap();
        assert_eq!(fetched, updated);
        assert_eq!(repo.count_cached_images().await.unwrap(), 1);
        assert!(repo.get_cached_image("k2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_cached_before_is_strict() {
        let repo = create_test_repo().await;

        repo.put_cached_image(&cached("old", 99)).await.unwrap();
        repo.put_cached_image(&cached("tie", 100)).await.unwrap();
        repo.put_cached_image(&cached("new", 101)).await.unwrap();

        let removed = repo.delete_cached_before(100).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get_cached_image("tie").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_oldest_cached() {
        let repo = create_test_repo().await;

        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            repo.put_cached_image(&cached(id, i as i64)).await.unwrap();
        }

        assert_eq!(repo.delete_oldest_cached(2).await.unwrap(), 2);
        assert!(repo.get_cached_image("a").await.unwrap().is_none());
        assert!(repo.get_cached_image("b").await.unwrap().is_none());
        assert!(repo.get_cached_image("c").await.unwrap().is_some());
        assert_eq!(repo.delete_oldest_cached(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_cached_by_name_and_clear() {
        let repo = create_test_repo().await;

        repo.put_cached_image(&cached("x", 1)).await.unwrap();
        repo.put_cached_image(&cached("y", 2)).await.unwrap();

        let found = repo.find_cached_by_name("x.jpg").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "x");

        assert_eq!(repo.clear_cached_images().await.unwrap(), 2);
        assert_eq!(repo.count_cached_images().await.unwrap(), 0);
        assert_eq!(repo.clear_cached_images().await.unwrap(), 0);
    }
}
