//! Artifact references and the deterministic naming policy
//!
//! Physical names:
//! - capture: `fire_{owner}_{YYYYMMDD_HHMMSS}_{millis}.{ext}` (plus `_{n}` on collision)
//! - reading: `reading_{reading_id}.{ext}`
//! - vision:  `vision_{reading_id}_{sanitized_label}.{ext}`
//!
//! On disk: `<artifact root>/<purpose>/[<owner>/]<name>`; capture and vision
//! artifacts are partitioned by owner, reading artifacts are not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{VisionError, VisionResult};

/// Owner used when a request carries no identity
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Why an artifact exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactPurpose {
    /// Transient fire capture awaiting promotion
    Capture,
    /// Permanent fire image bound to a reading
    Reading,
    /// Generated vision image
    Vision,
}

impl ArtifactPurpose {
    /// Directory under the artifact root
    pub fn directory(&self) -> &'static str {
        match self {
            ArtifactPurpose::Capture => "capture",
            ArtifactPurpose::Reading => "reading",
            ArtifactPurpose::Vision => "vision",
        }
    }

    /// Leading segment of the physical name
    pub fn name_prefix(&self) -> &'static str {
        match self {
            ArtifactPurpose::Capture => "fire",
            ArtifactPurpose::Reading => "reading",
            ArtifactPurpose::Vision => "vision",
        }
    }

    /// Whether files live in a per-owner subdirectory
    pub fn is_owner_scoped(&self) -> bool {
        !matches!(self, ArtifactPurpose::Reading)
    }

    /// Infer purpose from a physical name's prefix
    pub fn from_physical_name(name: &str) -> Option<Self> {
        [
            ArtifactPurpose::Capture,
            ArtifactPurpose::Reading,
            ArtifactPurpose::Vision,
        ]
        .into_iter()
        .find(|p| name.starts_with(&format!("{}_", p.name_prefix())))
    }
}

/// Accepted image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    /// Detect format from the payload's magic bytes
    ///
    /// The claimed extension or data-URL type is never trusted.
    pub fn detect(bytes: &[u8]) -> VisionResult<Self> {
        match infer::get(bytes).map(|kind| kind.mime_type()) {
            Some("image/png") => Ok(ImageFormat::Png),
            Some("image/jpeg") => Ok(ImageFormat::Jpeg),
            Some(other) => Err(VisionError::InvalidFormat(format!(
                "unsupported image type {} (expected PNG or JPEG)",
                other
            ))),
            None => Err(VisionError::InvalidFormat(
                "content is not a recognizable image".to_string(),
            )),
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

/// Logical identity of an artifact; determines purpose and naming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "purpose", rename_all = "lowercase")]
pub enum ArtifactKey {
    Capture,
    Reading { reading_id: String },
    Vision { reading_id: String, label: String },
}

impl ArtifactKey {
    pub fn purpose(&self) -> ArtifactPurpose {
        match self {
            ArtifactKey::Capture => ArtifactPurpose::Capture,
            ArtifactKey::Reading { .. } => ArtifactPurpose::Reading,
            ArtifactKey::Vision { .. } => ArtifactPurpose::Vision,
        }
    }

    /// Physical name for deterministic keys; `None` for captures,
    /// whose names depend on owner and time.
    pub fn deterministic_name(&self, format: ImageFormat) -> VisionResult<Option<String>> {
        match self {
            ArtifactKey::Capture => Ok(None),
            ArtifactKey::Reading { reading_id } => Ok(Some(format!(
                "{}_{}.{}",
                ArtifactPurpose::Reading.name_prefix(),
                required_component("reading id", reading_id)?,
                format.extension()
            ))),
            ArtifactKey::Vision { reading_id, label } => Ok(Some(format!(
                "{}_{}_{}.{}",
                ArtifactPurpose::Vision.name_prefix(),
                required_component("reading id", reading_id)?,
                required_component("vision label", label)?,
                format.extension()
            ))),
        }
    }
}

/// Metadata reference to a stored image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Sanitized owner identity
    pub owner: String,
    /// Logical identity (carries the purpose)
    pub key: ArtifactKey,
    /// Unique file name within the store
    pub physical_name: String,
    pub format: ImageFormat,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRef {
    pub fn purpose(&self) -> ArtifactPurpose {
        self.key.purpose()
    }

    /// Path relative to the artifact root
    pub fn relative_path(&self) -> PathBuf {
        relative_path(self.purpose(), &self.owner, &self.physical_name)
    }

    /// Public URL under the static artifact mount
    pub fn url(&self) -> String {
        let mut url = format!("/artifacts/{}/", self.purpose().directory());
        if self.purpose().is_owner_scoped() {
            url.push_str(&self.owner);
            url.push('/');
        }
        url.push_str(&self.physical_name);
        url
    }
}

/// Path of a physical name relative to the artifact root
pub fn relative_path(purpose: ArtifactPurpose, owner: &str, physical_name: &str) -> PathBuf {
    let mut path = PathBuf::from(purpose.directory());
    if purpose.is_owner_scoped() {
        path.push(owner);
    }
    path.push(physical_name);
    path
}

/// Strip every character outside `[A-Za-z0-9_-]`
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Sanitized owner; empty results fall back to the anonymous owner
pub fn sanitize_owner(raw: &str) -> String {
    let owner = sanitize_component(raw);
    if owner.is_empty() {
        ANONYMOUS_OWNER.to_string()
    } else {
        owner
    }
}

/// Reading ids are used verbatim in file names and must already be clean
pub fn validate_reading_id(reading_id: &str) -> VisionResult<&str> {
    if reading_id.is_empty() || sanitize_component(reading_id) != reading_id {
        return Err(VisionError::InvalidArgument(format!(
            "reading id '{}' must be non-empty and use only letters, digits, '_' or '-'",
            reading_id
        )));
    }
    Ok(reading_id)
}

fn required_component(what: &str, raw: &str) -> VisionResult<String> {
    let clean = sanitize_component(raw);
    if clean.is_empty() {
        Err(VisionError::InvalidArgument(format!(
            "{} '{}' has no usable characters",
            what, raw
        )))
    } else {
        Ok(clean)
    }
}

/// Capture name for an owner at a point in time
///
/// `attempt` 0 is the plain name; later attempts append `_{attempt + 1}`.
pub fn capture_name(owner: &str, at: DateTime<Utc>, format: ImageFormat, attempt: u32) -> String {
    let stamp = oracle_common::time::file_stamp(at);
    let prefix = ArtifactPurpose::Capture.name_prefix();
    if attempt == 0 {
        format!("{}_{}_{}.{}", prefix, owner, stamp, format.extension())
    } else {
        format!(
            "{}_{}_{}_{}.{}",
            prefix,
            owner,
            stamp,
            attempt + 1,
            format.extension()
        )
    }
}

/// Whether a client-supplied name is safe to join onto a directory
pub fn is_safe_physical_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
