//! Fire image capture endpoint
//!
//! POST /api/save-fire-image stores a captured frame under a temporary
//! capture name. The returned filename is what the client later submits
//! with its reading.

use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use oracle_common::events::OracleEvent;

use crate::api::Owner;
use crate::error::{ApiError, ApiResult};
use crate::models::ArtifactKey;
use crate::services::ImagePayload;
use crate::AppState;

/// POST /api/save-fire-image request
#[derive(Debug, Deserialize)]
pub struct SaveFireImageRequest {
    /// Base64 image, optionally a data URL
    #[serde(alias = "image")]
    pub image_data: String,
    /// Only `capture` (or its alias `fire`) is accepted here
    #[serde(default)]
    pub purpose: Option<String>,
    /// Free-form client metadata; logged, not stored
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// POST /api/save-fire-image response
#[derive(Debug, Serialize)]
pub struct SaveFireImageResponse {
    pub success: bool,
    pub image_url: String,
    pub filename: String,
    /// Path relative to the artifact root
    pub filepath: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// POST /api/save-fire-image
pub async fn save_fire_image(
    State(state): State<AppState>,
    owner: Owner,
    Json(request): Json<SaveFireImageRequest>,
) -> ApiResult<Json<SaveFireImageResponse>> {
    match request.purpose.as_deref().map(str::trim) {
        None | Some("") | Some("capture") | Some("fire") => {}
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "Unsupported purpose '{}'; fire images are saved as captures",
                other
            )))
        }
    }

    if let Some(metadata) = &request.metadata {
        tracing::debug!(owner = %owner.as_str(), metadata = %metadata, "Fire capture metadata");
    }

    let artifact = state
        .artifacts
        .save(
            ImagePayload::Base64(request.image_data),
            owner.as_str(),
            ArtifactKey::Capture,
        )
        .await?;

    tracing::info!(
        owner = %artifact.owner,
        filename = %artifact.physical_name,
        "Fire image saved"
    );
    state.event_bus.emit_lossy(OracleEvent::FireImageCaptured {
        owner: artifact.owner.clone(),
        filename: artifact.physical_name.clone(),
        timestamp: artifact.created_at,
    });

    Ok(Json(SaveFireImageResponse {
        success: true,
        image_url: artifact.url(),
        filepath: artifact.relative_path().to_string_lossy().replace('\\', "/"),
        filename: artifact.physical_name,
        timestamp: artifact.created_at,
        message: "Fire image saved successfully".to_string(),
    }))
}

/// Build fire image routes
pub fn fire_image_routes() -> Router<AppState> {
    Router::new().route("/api/save-fire-image", post(save_fire_image))
}
