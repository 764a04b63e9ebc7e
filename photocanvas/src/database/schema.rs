//! Database schema
//!
//! Versioned SQL scripts applied in order on open. Each script runs as one
//! batch inside a transaction together with its `schema_migrations` row.

use crate::error::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Executor;

struct SchemaScript {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const SCRIPTS: &[SchemaScript] = &[SchemaScript {
    version: 1,
    name: "initial_schema",
    sql: include_str!("migrations/001_initial_schema.sql"),
}];

/// Highest applied script version, 0 for a fresh database
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

/// Bring the schema up to the latest version
pub async fn initialize_database(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let current = schema_version(pool).await?;
    let pending: Vec<&SchemaScript> = SCRIPTS.iter().filter(|s| s.version > current).collect();

    if pending.is_empty() {
        tracing::debug!("Schema is current at version {}", current);
        return Ok(());
    }

    for script in pending {
        let mut tx = pool.begin().await?;
        (&mut *tx).execute(sqlx::raw_sql(script.sql)).await?;
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(script.version)
            .bind(script.name)
            .bind(Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Applied schema version {} ({})", script.version, script.name);
    }

    Ok(())
}
