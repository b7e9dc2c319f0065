//! Reading image bindings

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use oracle_common::{Error, Result};

use crate::models::{ArtifactKey, ArtifactRef};

const KIND_FIRE: &str = "fire";
const KIND_VISION: &str = "vision";

/// One image bound to a reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadingImage {
    pub reading_id: String,
    /// `fire` or `vision`
    pub kind: String,
    /// Vision label; `None` for the fire image
    pub vision: Option<String>,
    pub filename: String,
    pub owner: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Record the fire image a reading was cast from
pub async fn record_fire_image(
    pool: &SqlitePool,
    reading_id: &str,
    artifact: &ArtifactRef,
) -> Result<()> {
    upsert(pool, reading_id, KIND_FIRE, "", artifact).await
}

/// Record the succeeded images of a vision job
///
/// All rows are written in one transaction. Artifacts that are not vision
/// artifacts for `reading_id` are rejected.
pub async fn record_vision_images(
    pool: &SqlitePool,
    reading_id: &str,
    artifacts: &[ArtifactRef],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for artifact in artifacts {
        let label = match &artifact.key {
            ArtifactKey::Vision {
                reading_id: owner_reading,
                label,
            } if owner_reading == reading_id => label,
            other => {
                return Err(Error::InvalidInput(format!(
                    "{} is not a vision image of reading {} ({:?})",
                    artifact.physical_name, reading_id, other
                )))
            }
        };

        sqlx::query(UPSERT_SQL)
            .bind(reading_id)
            .bind(KIND_VISION)
            .bind(label)
            .bind(&artifact.physical_name)
            .bind(&artifact.owner)
            .bind(artifact.url())
            .bind(artifact.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// All images bound to a reading: the fire image first, then visions by label
pub async fn list_images(pool: &SqlitePool, reading_id: &str) -> Result<Vec<ReadingImage>> {
    let rows = sqlx::query(
        r#"
        SELECT reading_id, kind, vision, filename, owner, url, created_at
        FROM reading_images
        WHERE reading_id = ?
        ORDER BY CASE kind WHEN 'fire' THEN 0 ELSE 1 END, id
        "#,
    )
    .bind(reading_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let vision: String = row.get("vision");
            let created_at: String = row.get("created_at");
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
                .with_timezone(&Utc);

            Ok(ReadingImage {
                reading_id: row.get("reading_id"),
                kind: row.get("kind"),
                vision: (!vision.is_empty()).then_some(vision),
                filename: row.get("filename"),
                owner: row.get("owner"),
                url: row.get("url"),
                created_at,
            })
        })
        .collect()
}

const UPSERT_SQL: &str = r#"
    INSERT INTO reading_images (reading_id, kind, vision, filename, owner, url, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(reading_id, kind, vision) DO UPDATE SET
        filename = excluded.filename,
        owner = excluded.owner,
        url = excluded.url,
        created_at = excluded.created_at
"#;

async fn upsert(
    pool: &SqlitePool,
    reading_id: &str,
    kind: &str,
    vision: &str,
    artifact: &ArtifactRef,
) -> Result<()> {
    sqlx::query(UPSERT_SQL)
        .bind(reading_id)
        .bind(kind)
        .bind(vision)
        .bind(&artifact.physical_name)
        .bind(&artifact.owner)
        .bind(artifact.url())
        .bind(artifact.created_at.to_rfc3339())
        .execute(pool)
        .await?;
    Ok(())
}
