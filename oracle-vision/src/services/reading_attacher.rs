//! Attach finished vision images to their reading
//!
//! The job tracker calls this exactly once per job, after every item is
//! terminal, with the succeeded artifacts in request order.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db;
use crate::error::{VisionError, VisionResult};
use crate::models::ArtifactRef;

/// External "attach results to reading" collaborator
#[async_trait]
pub trait ReadingAttacher: Send + Sync {
    async fn attach_vision_images(
        &self,
        reading_id: &str,
        owner: &str,
        images: &[ArtifactRef],
    ) -> VisionResult<()>;
}

/// Records vision images in the `reading_images` table
pub struct SqliteReadingAttacher {
    pool: SqlitePool,
}

impl SqliteReadingAttacher {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadingAttacher for SqliteReadingAttacher {
    async fn attach_vision_images(
        &self,
        reading_id: &str,
        owner: &str,
        images: &[ArtifactRef],
    ) -> VisionResult<()> {
        if images.is_empty() {
            tracing::info!(reading_id = %reading_id, owner = %owner, "No vision images to attach");
            return Ok(());
        }

        db::readings::record_vision_images(&self.pool, reading_id, images)
            .await
            .map_err(|e| VisionError::StorageUnavailable(format!("attach vision images: {}", e)))?;

        tracing::info!(
            reading_id = %reading_id,
            owner = %owner,
            count = images.len(),
            "Vision images attached to reading"
        );
        Ok(())
    }
}
