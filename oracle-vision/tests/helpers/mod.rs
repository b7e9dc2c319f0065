//! Test Helper Utilities
//!
//! Shared fixtures for oracle-vision integration tests
#![allow(dead_code)]

pub mod mocks;

pub use mocks::{AttachCall, MockGenerator, RecordingAttacher};

use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use oracle_common::events::EventBus;
use oracle_vision::models::JobSnapshot;
use oracle_vision::models::JobStatus;
use oracle_vision::services::{ArtifactStore, ImageGenerator, JobTracker, TrackerConfig};
use oracle_vision::AppState;

/// 1x1 transparent PNG
pub const TINY_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub fn png_bytes() -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(TINY_PNG_BASE64)
        .unwrap()
}

/// PNG with `marker` appended after the image data, so contents differ
pub fn png_bytes_with(marker: &str) -> Vec<u8> {
    let mut bytes = png_bytes();
    bytes.extend_from_slice(marker.as_bytes());
    bytes
}

/// JPEG/JFIF header followed by filler
pub fn jpeg_bytes() -> Vec<u8> {
    let mut bytes = vec![
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00,
    ];
    bytes.extend_from_slice(&[0u8; 32]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

pub fn png_data_url() -> String {
    format!("data:image/png;base64,{}", TINY_PNG_BASE64)
}

/// Artifact store rooted in a fresh temp dir; keep the TempDir alive
pub fn temp_store() -> (TempDir, Arc<ArtifactStore>) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(ArtifactStore::new(dir.path().join("artifacts")));
    (dir, store)
}

/// Short timeouts so failure paths resolve quickly
pub fn fast_config() -> TrackerConfig {
    TrackerConfig {
        call_timeout: Duration::from_millis(300),
        retention: Duration::from_secs(3600),
        max_concurrent: 4,
    }
}

pub fn test_tracker(
    store: Arc<ArtifactStore>,
    generator: Arc<dyn ImageGenerator>,
    attacher: Arc<RecordingAttacher>,
    config: TrackerConfig,
) -> Arc<JobTracker> {
    Arc::new(JobTracker::new(
        store,
        generator,
        attacher,
        EventBus::new(100),
        config,
    ))
}

/// Poll `status` until the job completes or `timeout` elapses
pub async fn wait_for_completion(
    tracker: &JobTracker,
    job_id: Uuid,
    timeout: Duration,
) -> JobSnapshot {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let snapshot = tracker.status(job_id).unwrap();
        if snapshot.status == JobStatus::Completed || tokio::time::Instant::now() >= deadline {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Router-level fixture
pub struct TestApp {
    pub router: axum::Router,
    pub state: AppState,
    pub attacher: Arc<RecordingAttacher>,
    pub generator: Arc<MockGenerator>,
    _dir: TempDir,
}

/// App over an in-memory database, temp artifact root and mock generator
pub async fn create_test_app(generator: MockGenerator) -> TestApp {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    oracle_vision::db::init_tables(&pool)
        .await
        .expect("Failed to initialize database schema");

    let (dir, store) = temp_store();
    let generator = Arc::new(generator);
    let attacher = Arc::new(RecordingAttacher::new());
    let event_bus = EventBus::new(100);
    let tracker = Arc::new(JobTracker::new(
        Arc::clone(&store),
        Arc::clone(&generator) as Arc<dyn ImageGenerator>,
        Arc::clone(&attacher) as Arc<dyn oracle_vision::services::ReadingAttacher>,
        event_bus.clone(),
        fast_config(),
    ));

    let state = AppState::new(pool, event_bus, store, tracker);
    let router = oracle_vision::build_router(state.clone());

    TestApp {
        router,
        state,
        attacher,
        generator,
        _dir: dir,
    }
}
