//! oracle-vision library interface
//!
//! Fire image capture and promotion, vision extraction, and background
//! vision image generation for oracle readings. Exposed as a library so
//! integration tests can build the router without a socket.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult, VisionError, VisionResult};

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::services::ServeDir;

use oracle_common::events::EventBus;

use crate::services::{ArtifactStore, CapturePipeline, JobTracker};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Reading image bindings
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub artifacts: Arc<ArtifactStore>,
    pub pipeline: Arc<CapturePipeline>,
    pub tracker: Arc<JobTracker>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// The tracker must share `artifacts` and `event_bus` with the state
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        artifacts: Arc<ArtifactStore>,
        tracker: Arc<JobTracker>,
    ) -> Self {
        Self {
            db,
            event_bus,
            pipeline: Arc::new(CapturePipeline::new(Arc::clone(&artifacts))),
            artifacts,
            tracker,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Stored artifacts are served read-only under `/artifacts`.
pub fn build_router(state: AppState) -> Router {
    let artifact_files = ServeDir::new(state.artifacts.root());

    Router::new()
        .merge(api::fire_image_routes())
        .merge(api::reading_routes())
        .merge(api::vision_routes())
        .merge(api::health_routes())
        .route("/api/vision-events", get(api::vision_event_stream))
        .route("/api/events", get(api::all_event_stream))
        .nest_service("/artifacts", artifact_files)
        .with_state(state)
}
