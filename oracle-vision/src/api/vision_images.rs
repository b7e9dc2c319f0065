//! Vision endpoints
//!
//! POST /api/extract-visions, POST /api/generate-vision-images,
//! GET /api/vision-images-status/:generation_id

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::Owner;
use crate::error::{ApiError, ApiResult};
use crate::models::{GenerationContext, ItemState, JobSnapshot, JobStatus};
use crate::services::vision_extractor;
use crate::AppState;

/// POST /api/extract-visions request
#[derive(Debug, Deserialize)]
pub struct ExtractVisionsRequest {
    /// Reading text; anything but a string is rejected
    #[serde(default)]
    pub text: serde_json::Value,
}

/// POST /api/extract-visions response
#[derive(Debug, Serialize)]
pub struct ExtractVisionsResponse {
    pub visions: Vec<String>,
}

/// POST /api/generate-vision-images request
#[derive(Debug, Deserialize)]
pub struct GenerateVisionImagesRequest {
    pub reading_id: String,
    #[serde(default)]
    pub fire_image_filename: Option<String>,
    #[serde(default)]
    pub visions: Vec<String>,
    /// Optional reading text fed into the prompt
    #[serde(default)]
    pub reading_excerpt: Option<String>,
}

/// POST /api/generate-vision-images response
#[derive(Debug, Serialize)]
pub struct GenerateVisionImagesResponse {
    pub success: bool,
    pub generation_id: Uuid,
    pub expected_images: usize,
}

/// Succeeded image in a status response
#[derive(Debug, Serialize)]
pub struct VisionImage {
    pub vision: String,
    pub url: String,
    pub filename: String,
}

/// Per-item entry in a status response
#[derive(Debug, Serialize)]
pub struct VisionItemStatus {
    pub vision: String,
    /// `pending`, `succeeded` or `failed`
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// GET /api/vision-images-status/:generation_id response
#[derive(Debug, Serialize)]
pub struct VisionImagesStatusResponse {
    pub generation_id: Uuid,
    pub reading_id: String,
    pub status: JobStatus,
    /// Succeeded images in request order
    pub images: Vec<VisionImage>,
    pub expected_images: usize,
    /// Every item in request order
    pub items: Vec<VisionItemStatus>,
}

impl From<JobSnapshot> for VisionImagesStatusResponse {
    fn from(snapshot: JobSnapshot) -> Self {
        let images = snapshot
            .succeeded()
            .map(|(vision, artifact)| VisionImage {
                vision: vision.to_string(),
                url: artifact.url(),
                filename: artifact.physical_name.clone(),
            })
            .collect();

        let items = snapshot
            .items
            .iter()
            .map(|item| match &item.state {
                ItemState::Pending => VisionItemStatus {
                    vision: item.vision.clone(),
                    state: "pending",
                    reason: None,
                    filename: None,
                    url: None,
                },
                ItemState::Succeeded { artifact } => VisionItemStatus {
                    vision: item.vision.clone(),
                    state: "succeeded",
                    reason: None,
                    filename: Some(artifact.physical_name.clone()),
                    url: Some(artifact.url()),
                },
                ItemState::Failed { reason } => VisionItemStatus {
                    vision: item.vision.clone(),
                    state: "failed",
                    reason: Some(reason.clone()),
                    filename: None,
                    url: None,
                },
            })
            .collect();

        Self {
            generation_id: snapshot.job_id,
            reading_id: snapshot.reading_id.clone(),
            status: snapshot.status,
            images,
            expected_images: snapshot.items.len(),
            items,
        }
    }
}

/// POST /api/extract-visions
pub async fn extract_visions(
    Json(request): Json<ExtractVisionsRequest>,
) -> ApiResult<Json<ExtractVisionsResponse>> {
    let visions = vision_extractor::extract_from_value(&request.text)?;
    tracing::debug!(count = visions.len(), "Visions extracted");
    Ok(Json(ExtractVisionsResponse { visions }))
}

/// POST /api/generate-vision-images
///
/// Returns as soon as the job is registered; poll the status endpoint.
pub async fn generate_vision_images(
    State(state): State<AppState>,
    owner: Owner,
    Json(request): Json<GenerateVisionImagesRequest>,
) -> ApiResult<Json<GenerateVisionImagesResponse>> {
    let expected_images = request.visions.len();
    let context = GenerationContext {
        fire_image_filename: request.fire_image_filename,
        reading_excerpt: request.reading_excerpt,
    };

    let generation_id =
        state
            .tracker
            .start(owner.as_str(), &request.reading_id, request.visions, context)?;

    Ok(Json(GenerateVisionImagesResponse {
        success: true,
        generation_id,
        expected_images,
    }))
}

/// GET /api/vision-images-status/:generation_id
pub async fn vision_images_status(
    State(state): State<AppState>,
    Path(generation_id): Path<String>,
) -> ApiResult<Json<VisionImagesStatusResponse>> {
    let job_id = Uuid::parse_str(&generation_id)
        .map_err(|_| ApiError::NotFound(format!("Generation not found: {}", generation_id)))?;

    let snapshot = state.tracker.status(job_id)?;
    tracing::debug!(
        generation_id = %job_id,
        status = ?snapshot.status,
        pending = snapshot.count_pending(),
        "Vision status query"
    );

    Ok(Json(snapshot.into()))
}

/// Build vision routes
pub fn vision_routes() -> Router<AppState> {
    Router::new()
        .route("/api/extract-visions", post(extract_visions))
        .route("/api/generate-vision-images", post(generate_vision_images))
        .route(
            "/api/vision-images-status/:generation_id",
            get(vision_images_status),
        )
}
