//! Database access for oracle-vision
//!
//! Readings live elsewhere; this database only records which images are
//! bound to which reading.

pub mod readings;

use oracle_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Opens (creating if needed) `oracle.db` in the root folder.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create oracle-vision tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reading_images (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reading_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('fire', 'vision')),
            vision TEXT NOT NULL DEFAULT '',
            filename TEXT NOT NULL,
            owner TEXT NOT NULL,
            url TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (reading_id, kind, vision)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reading_images_reading ON reading_images(reading_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (reading_images)");

    Ok(())
}
