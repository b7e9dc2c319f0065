//! HTTP API handlers for oracle-vision
//!
//! REST endpoints for fire image capture, reading binding, vision extraction
//! and vision image generation, plus SSE for job progress.

pub mod fire_images;
pub mod health;
pub mod readings;
pub mod sse;
pub mod vision_images;

pub use fire_images::fire_image_routes;
pub use health::health_routes;
pub use readings::reading_routes;
pub use sse::{all_event_stream, vision_event_stream};
pub use vision_images::vision_routes;

use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

use crate::models::artifact::sanitize_owner;

/// Header carrying the requesting user's name
pub const OWNER_HEADER: &str = "x-oracle-user";

/// Requesting user, sanitized; `anonymous` when the header is absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        Ok(Owner(sanitize_owner(raw)))
    }
}
