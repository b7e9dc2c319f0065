//! Core services: artifact storage, capture promotion, vision extraction and
//! background image generation

pub mod artifact_store;
pub mod capture_pipeline;
pub mod image_generator;
pub mod job_tracker;
pub mod reading_attacher;
pub mod vision_extractor;

pub use artifact_store::{ArtifactStore, ImagePayload};
pub use capture_pipeline::{CapturePipeline, CaptureSource, RawImage};
pub use image_generator::{ImageGenerator, OpenAiImageClient};
pub use job_tracker::{JobTracker, TrackerConfig};
pub use reading_attacher::{ReadingAttacher, SqliteReadingAttacher};
