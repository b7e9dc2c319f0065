//! Reading image endpoints
//!
//! POST /api/readings/:reading_id/fire-image binds the client's fire image
//! (stored capture name or inline base64) to a reading.
//! GET /api/readings/:reading_id/images lists everything bound so far.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use oracle_common::events::OracleEvent;

use crate::api::Owner;
use crate::db::readings::{self, ReadingImage};
use crate::error::ApiResult;
use crate::models::artifact::validate_reading_id;
use crate::services::CaptureSource;
use crate::AppState;

/// POST /api/readings/:reading_id/fire-image request
#[derive(Debug, Deserialize)]
pub struct BindFireImageRequest {
    /// Capture filename from /api/save-fire-image, or inline base64 data
    #[serde(default)]
    pub fire_image_data: String,
}

/// POST /api/readings/:reading_id/fire-image response
#[derive(Debug, Serialize)]
pub struct BindFireImageResponse {
    pub success: bool,
    pub reading_id: String,
    pub filename: String,
    pub image_url: String,
}

/// GET /api/readings/:reading_id/images response
#[derive(Debug, Serialize)]
pub struct ReadingImagesResponse {
    pub reading_id: String,
    pub images: Vec<ReadingImage>,
}

/// POST /api/readings/:reading_id/fire-image
pub async fn bind_fire_image(
    State(state): State<AppState>,
    owner: Owner,
    Path(reading_id): Path<String>,
    Json(request): Json<BindFireImageRequest>,
) -> ApiResult<Json<BindFireImageResponse>> {
    validate_reading_id(&reading_id)?;
    let source = CaptureSource::from_client_field(&request.fire_image_data)?;

    let artifact = state
        .pipeline
        .bind_to_reading(owner.as_str(), &source, &reading_id)
        .await?;

    readings::record_fire_image(&state.db, &reading_id, &artifact).await?;

    tracing::info!(
        reading_id = %reading_id,
        owner = %owner.as_str(),
        filename = %artifact.physical_name,
        "Fire image bound to reading"
    );
    state.event_bus.emit_lossy(OracleEvent::FireImagePromoted {
        reading_id: reading_id.clone(),
        filename: artifact.physical_name.clone(),
        timestamp: artifact.created_at,
    });

    Ok(Json(BindFireImageResponse {
        success: true,
        image_url: artifact.url(),
        filename: artifact.physical_name,
        reading_id,
    }))
}

/// GET /api/readings/:reading_id/images
pub async fn list_reading_images(
    State(state): State<AppState>,
    Path(reading_id): Path<String>,
) -> ApiResult<Json<ReadingImagesResponse>> {
    validate_reading_id(&reading_id)?;
    let images = readings::list_images(&state.db, &reading_id).await?;
    Ok(Json(ReadingImagesResponse { reading_id, images }))
}

/// Build reading routes
pub fn reading_routes() -> Router<AppState> {
    Router::new()
        .route("/api/readings/:reading_id/fire-image", post(bind_fire_image))
        .route("/api/readings/:reading_id/images", get(list_reading_images))
}
