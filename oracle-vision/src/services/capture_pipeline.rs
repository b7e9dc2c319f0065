//! Capture-to-reading promotion
//!
//! A fire image reaches reading submission either as the name of a capture
//! already stored on the server, or as inline base64 when the client never
//! got (or lost) that name. Both paths end with exactly one `reading`
//! artifact for the reading.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{VisionError, VisionResult};
use crate::models::{ArtifactKey, ArtifactRef, ImageFormat};
use crate::services::artifact_store::{ArtifactStore, ImagePayload};

const RETRY_CAPTURE: &str = "Fire image not found on server. Please capture a new image.";

/// Where the client's fire image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// Name returned by the save endpoint
    Stored { filename: String },
    /// Base64 image data (optionally a data URL)
    Inline { data: String },
}

impl CaptureSource {
    /// Classify the client's `fire_image_data` field
    ///
    /// Bare file names ending in `.png`, `.jpg` or `.jpeg` are stored
    /// references; anything else is treated as inline data.
    pub fn from_client_field(raw: &str) -> VisionResult<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(VisionError::ImageUnavailable(
                "No fire image captured. Please capture a fire image first.".to_string(),
            ));
        }

        let lower = value.to_ascii_lowercase();
        let looks_like_file = [".png", ".jpg", ".jpeg"]
            .iter()
            .any(|ext| lower.ends_with(ext));
        if looks_like_file && !value.contains('/') && !value.contains('\\') {
            Ok(CaptureSource::Stored {
                filename: value.to_string(),
            })
        } else {
            Ok(CaptureSource::Inline {
                data: value.to_string(),
            })
        }
    }
}

/// Decoded fire image plus the capture it came from, if any
#[derive(Debug, Clone)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    /// Stored capture this image was read from; `None` for inline data
    pub capture: Option<ArtifactRef>,
}

/// Promotes captures to reading-bound artifacts
#[derive(Debug, Clone)]
pub struct CapturePipeline {
    store: Arc<ArtifactStore>,
}

impl CapturePipeline {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self { store }
    }

    /// Load the fire image for a reading
    ///
    /// Any failure to produce a valid image is `ImageUnavailable`, which the
    /// caller shows as "please capture again".
    pub async fn load_for_reading(
        &self,
        owner: &str,
        source: &CaptureSource,
    ) -> VisionResult<RawImage> {
        match source {
            CaptureSource::Stored { filename } => {
                let capture = self
                    .store
                    .lookup_capture(owner, filename)
                    .await
                    .map_err(|e| unavailable(filename, e))?;
                let bytes = self
                    .store
                    .resolve(owner, filename)
                    .await
                    .map_err(|e| unavailable(filename, e))?;
                let format = ImageFormat::detect(&bytes).map_err(|e| unavailable(filename, e))?;
                info!(owner = %owner, filename = %filename, "Using server-stored fire image");
                Ok(RawImage {
                    bytes,
                    format,
                    capture: Some(capture),
                })
            }
            CaptureSource::Inline { data } => {
                let bytes = ImagePayload::Base64(data.clone())
                    .into_bytes()
                    .and_then(|bytes| ImageFormat::detect(&bytes).map(|format| (bytes, format)));
                match bytes {
                    Ok((bytes, format)) => {
                        info!(owner = %owner, "Using inline fire image data");
                        Ok(RawImage {
                            bytes,
                            format,
                            capture: None,
                        })
                    }
                    Err(e) => {
                        warn!(owner = %owner, error = %e, "Inline fire image could not be decoded");
                        Err(VisionError::ImageUnavailable(
                            "Fire image data could not be read. Please capture a new image."
                                .to_string(),
                        ))
                    }
                }
            }
        }
    }

    /// Bind a loaded image to `reading_id`
    ///
    /// Stored captures are moved (not copied). Inline data is saved directly
    /// under the reading name. If the capture disappeared after loading, the
    /// bytes already in hand are saved instead so nothing is lost.
    pub async fn finalize(
        &self,
        owner: &str,
        image: RawImage,
        reading_id: &str,
    ) -> VisionResult<ArtifactRef> {
        let key = ArtifactKey::Reading {
            reading_id: reading_id.to_string(),
        };

        if let Some(capture) = &image.capture {
            match self.store.rename(capture, key.clone()).await {
                Ok(artifact) => {
                    info!(
                        reading_id = %reading_id,
                        from = %capture.physical_name,
                        to = %artifact.physical_name,
                        "Capture promoted to reading image"
                    );
                    return Ok(artifact);
                }
                Err(VisionError::NotFound(_)) => {
                    warn!(
                        reading_id = %reading_id,
                        filename = %capture.physical_name,
                        "Capture vanished before promotion, saving loaded bytes"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let artifact = self
            .store
            .save(ImagePayload::Raw(image.bytes), owner, key)
            .await?;
        info!(
            reading_id = %reading_id,
            filename = %artifact.physical_name,
            "Inline fire image saved as reading image"
        );
        Ok(artifact)
    }

    /// Bind the client's fire image to `reading_id`
    ///
    /// Stored captures go straight to `rename`, so resubmitting a capture
    /// that was already promoted returns the existing reading image. Inline
    /// data runs `load_for_reading` followed by `finalize`.
    pub async fn bind_to_reading(
        &self,
        owner: &str,
        source: &CaptureSource,
        reading_id: &str,
    ) -> VisionResult<ArtifactRef> {
        match source {
            CaptureSource::Stored { filename } => {
                let capture = self
                    .store
                    .capture_ref(owner, filename)
                    .map_err(|e| unavailable(filename, e))?;
                let key = ArtifactKey::Reading {
                    reading_id: reading_id.to_string(),
                };
                let artifact = self
                    .store
                    .rename(&capture, key)
                    .await
                    .map_err(|e| match e {
                        VisionError::NotFound(_) => unavailable(filename, e),
                        other => other,
                    })?;
                info!(
                    reading_id = %reading_id,
                    from = %filename,
                    to = %artifact.physical_name,
                    "Stored capture bound to reading"
                );
                Ok(artifact)
            }
            CaptureSource::Inline { .. } => {
                let image = self.load_for_reading(owner, source).await?;
                self.finalize(owner, image, reading_id).await
            }
        }
    }
}

fn unavailable(filename: &str, cause: VisionError) -> VisionError {
    match cause {
        VisionError::StorageUnavailable(_) => cause,
        other => {
            warn!(filename = %filename, error = %other, "Stored fire image unavailable");
            VisionError::ImageUnavailable(RETRY_CAPTURE.to_string())
        }
    }
}
