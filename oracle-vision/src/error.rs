//! Error types for oracle-vision
//!
//! `VisionError` is the domain taxonomy shared by the artifact store, the
//! capture pipeline and the job tracker. `ApiError` maps it onto HTTP.
//! User-correctable kinds keep their message; storage and provider failures
//! are logged in full and surface as a generic body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Domain error type
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VisionError {
    /// Payload is not a decodable PNG/JPEG image
    #[error("Invalid image format: {0}")]
    InvalidFormat(String),

    /// Filesystem or database could not be written or read
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Artifact or job does not exist (or was evicted)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Target name is already taken by a different artifact
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Neither a stored capture nor inline data could be loaded
    #[error("Image unavailable: {0}")]
    ImageUnavailable(String),

    /// Malformed request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// External image generation failed
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// External image generation did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),
}

/// Result type for domain operations
pub type VisionResult<T> = Result<T, VisionError>;

const STORAGE_FAILED: &str = "Failed to store image. Please try again.";
const PROVIDER_FAILED: &str = "Image generation service unavailable.";
const PROVIDER_TIMED_OUT: &str = "Image generation timed out.";

impl VisionError {
    pub(crate) fn storage(context: &str, err: std::io::Error) -> Self {
        VisionError::StorageUnavailable(format!("{}: {}", context, err))
    }

    /// Text safe to hand to clients
    ///
    /// Storage, provider and timeout details (paths, URLs, keys) stay in the
    /// server log.
    pub fn public_message(&self) -> String {
        match self {
            VisionError::StorageUnavailable(_) => STORAGE_FAILED.to_string(),
            VisionError::ProviderError(_) => PROVIDER_FAILED.to_string(),
            VisionError::Timeout(_) => PROVIDER_TIMED_OUT.to_string(),
            other => other.to_string(),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Domain error
    #[error(transparent)]
    Vision(#[from] VisionError),

    /// oracle-common error
    #[error("Common error: {0}")]
    Common(#[from] oracle_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Vision(err) => match err {
                VisionError::InvalidFormat(msg) => {
                    (StatusCode::BAD_REQUEST, "INVALID_FORMAT", msg)
                }
                VisionError::InvalidArgument(msg) => {
                    (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", msg)
                }
                VisionError::ImageUnavailable(msg) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "IMAGE_UNAVAILABLE", msg)
                }
                VisionError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
                VisionError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
                VisionError::StorageUnavailable(detail) => {
                    tracing::error!(error = %detail, "Storage failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE_UNAVAILABLE",
                        STORAGE_FAILED.to_string(),
                    )
                }
                VisionError::ProviderError(detail) => {
                    tracing::error!(error = %detail, "Image provider failure");
                    (
                        StatusCode::BAD_GATEWAY,
                        "PROVIDER_ERROR",
                        PROVIDER_FAILED.to_string(),
                    )
                }
                VisionError::Timeout(detail) => {
                    tracing::error!(error = %detail, "Image provider timeout");
                    (
                        StatusCode::GATEWAY_TIMEOUT,
                        "TIMEOUT",
                        PROVIDER_TIMED_OUT.to_string(),
                    )
                }
            },
            ApiError::Common(err) => {
                tracing::error!(error = %err, "Internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
