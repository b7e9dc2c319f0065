//! Data models for oracle-vision
//!
//! - Artifact references and naming policy
//! - Vision generation job state

pub mod artifact;
pub mod generation_job;

pub use artifact::{ArtifactKey, ArtifactPurpose, ArtifactRef, ImageFormat, ANONYMOUS_OWNER};
pub use generation_job::{
    GenerationContext, ItemSnapshot, ItemState, JobItems, JobSnapshot, JobStatus,
};
