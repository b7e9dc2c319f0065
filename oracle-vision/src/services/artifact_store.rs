//! Filesystem-backed artifact store
//!
//! Validates image payloads by magic bytes before touching the filesystem,
//! claims unique names with create-new semantics, and moves captures to
//! their permanent names under a store-wide rename lock.

use base64::Engine;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{VisionError, VisionResult};
use crate::models::artifact::{
    capture_name, is_safe_physical_name, relative_path, sanitize_owner,
};
use crate::models::{ArtifactKey, ArtifactPurpose, ArtifactRef, ImageFormat};

/// Give up claiming a capture name after this many collisions
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Image payload as received from a client or provider
#[derive(Debug, Clone)]
pub enum ImagePayload {
    Raw(Vec<u8>),
    /// Base64 text, optionally prefixed by a `data:...;base64,` URL header
    Base64(String),
}

impl ImagePayload {
    /// Decode to raw bytes
    pub fn into_bytes(self) -> VisionResult<Vec<u8>> {
        let bytes = match self {
            ImagePayload::Raw(bytes) => bytes,
            ImagePayload::Base64(text) => decode_base64_image(&text)?,
        };
        if bytes.is_empty() {
            return Err(VisionError::InvalidFormat("image payload is empty".to_string()));
        }
        Ok(bytes)
    }
}

/// Decode base64 image text, stripping any data-URL header and whitespace
pub fn decode_base64_image(text: &str) -> VisionResult<Vec<u8>> {
    let body = match text.trim().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| {
                VisionError::InvalidFormat("data URL is not base64-encoded".to_string())
            })?,
        None => text.trim(),
    };
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();

    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| VisionError::InvalidFormat(format!("invalid base64 image data: {}", e)))
}

/// Artifact store rooted at a single directory
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    rename_lock: Mutex<()>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            rename_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a reference
    pub fn path_of(&self, artifact: &ArtifactRef) -> PathBuf {
        self.root.join(artifact.relative_path())
    }

    /// Validate and store an image
    ///
    /// Nothing is written unless the payload decodes to a PNG or JPEG.
    /// Captures get a fresh unique name; readings fail with `Conflict` if the
    /// reading already has an image; visions atomically replace any earlier
    /// image for the same reading and label.
    pub async fn save(
        &self,
        payload: ImagePayload,
        owner: &str,
        key: ArtifactKey,
    ) -> VisionResult<ArtifactRef> {
        let bytes = payload.into_bytes()?;
        let format = ImageFormat::detect(&bytes)?;
        let owner = sanitize_owner(owner);
        let purpose = key.purpose();
        let deterministic = key.deterministic_name(format)?;

        let dir = self.directory(purpose, &owner);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| VisionError::storage("create artifact directory", e))?;

        let created_at = Utc::now();
        let physical_name = match deterministic {
            None => self.write_capture(&dir, &owner, created_at, format, &bytes).await?,
            Some(name) if purpose == ArtifactPurpose::Reading => {
                write_new(&dir.join(&name), &bytes).await.map_err(|e| {
                    if e.kind() == ErrorKind::AlreadyExists {
                        VisionError::Conflict(format!("{} already exists", name))
                    } else {
                        VisionError::storage("write reading image", e)
                    }
                })?;
                name
            }
            Some(name) => {
                write_replacing(&dir, &name, &bytes).await?;
                name
            }
        };

        info!(
            owner = %owner,
            purpose = ?purpose,
            filename = %physical_name,
            bytes = bytes.len(),
            "Artifact saved"
        );

        Ok(ArtifactRef {
            owner,
            key,
            physical_name,
            format,
            created_at,
        })
    }

    /// Move an artifact to the deterministic name of `new_key`
    ///
    /// Idempotent: when the source is gone but the target exists, the earlier
    /// move is assumed to have succeeded and the target reference is returned.
    /// A target that exists while the source also exists is a `Conflict`.
    pub async fn rename(
        &self,
        existing: &ArtifactRef,
        new_key: ArtifactKey,
    ) -> VisionResult<ArtifactRef> {
        let target_name = new_key
            .deterministic_name(existing.format)?
            .ok_or_else(|| {
                VisionError::InvalidArgument("cannot rename into a capture".to_string())
            })?;
        let owner = existing.owner.clone();
        let target_dir = self.directory(new_key.purpose(), &owner);
        let source = self.path_of(existing);
        let target = target_dir.join(&target_name);

        // Existence checks and the move happen under one lock
        let _guard = self.rename_lock.lock().await;

        let source_exists = exists(&source).await?;
        let target_exists = exists(&target).await?;

        match (source_exists, target_exists) {
            (true, true) => Err(VisionError::Conflict(format!(
                "{} already exists",
                target_name
            ))),
            (true, false) => {
                tokio::fs::create_dir_all(&target_dir)
                    .await
                    .map_err(|e| VisionError::storage("create artifact directory", e))?;
                tokio::fs::rename(&source, &target)
                    .await
                    .map_err(|e| VisionError::storage("rename artifact", e))?;
                info!(
                    from = %existing.physical_name,
                    to = %target_name,
                    "Artifact renamed"
                );
                Ok(ArtifactRef {
                    owner,
                    key: new_key,
                    physical_name: target_name,
                    format: existing.format,
                    created_at: Utc::now(),
                })
            }
            (false, true) => {
                debug!(
                    from = %existing.physical_name,
                    to = %target_name,
                    "Rename already applied, returning existing target"
                );
                let created_at = modified_at(&target).await;
                Ok(ArtifactRef {
                    owner,
                    key: new_key,
                    physical_name: target_name,
                    format: existing.format,
                    created_at,
                })
            }
            (false, false) => Err(VisionError::NotFound(format!(
                "artifact {} does not exist",
                existing.physical_name
            ))),
        }
    }

    /// Read back a stored artifact by owner and physical name
    pub async fn resolve(&self, owner: &str, physical_name: &str) -> VisionResult<Vec<u8>> {
        let path = self.locate(owner, physical_name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(VisionError::NotFound(format!(
                "artifact {} does not exist",
                physical_name
            ))),
            Err(e) => Err(VisionError::storage("read artifact", e)),
        }
    }

    /// Rebuild the reference of a stored capture from its name
    pub async fn lookup_capture(&self, owner: &str, physical_name: &str) -> VisionResult<ArtifactRef> {
        let capture = self.capture_ref(owner, physical_name)?;
        let path = self.path_of(&capture);
        if !exists(&path).await? {
            return Err(VisionError::NotFound(format!(
                "capture {} does not exist",
                physical_name
            )));
        }
        Ok(ArtifactRef {
            created_at: modified_at(&path).await,
            ..capture
        })
    }

    /// Reference a capture by name without touching the filesystem
    ///
    /// The file may already have been promoted; `rename` sorts that out.
    pub fn capture_ref(&self, owner: &str, physical_name: &str) -> VisionResult<ArtifactRef> {
        if ArtifactPurpose::from_physical_name(physical_name) != Some(ArtifactPurpose::Capture)
            || !is_safe_physical_name(physical_name)
        {
            return Err(VisionError::NotFound(format!(
                "{} is not a capture",
                physical_name
            )));
        }
        let format = Path::new(physical_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
            .ok_or_else(|| {
                VisionError::InvalidFormat(format!("{} has no image extension", physical_name))
            })?;

        Ok(ArtifactRef {
            owner: sanitize_owner(owner),
            key: ArtifactKey::Capture,
            physical_name: physical_name.to_string(),
            format,
            created_at: Utc::now(),
        })
    }

    fn directory(&self, purpose: ArtifactPurpose, owner: &str) -> PathBuf {
        let mut dir = self.root.join(purpose.directory());
        if purpose.is_owner_scoped() {
            dir.push(owner);
        }
        dir
    }

    fn locate(&self, owner: &str, physical_name: &str) -> VisionResult<PathBuf> {
        if !is_safe_physical_name(physical_name) {
            return Err(VisionError::NotFound(format!(
                "artifact {} does not exist",
                physical_name
            )));
        }
        let purpose = ArtifactPurpose::from_physical_name(physical_name).ok_or_else(|| {
            VisionError::NotFound(format!("artifact {} does not exist", physical_name))
        })?;
        Ok(self
            .root
            .join(relative_path(purpose, &sanitize_owner(owner), physical_name)))
    }

    async fn write_capture(
        &self,
        dir: &Path,
        owner: &str,
        at: DateTime<Utc>,
        format: ImageFormat,
        bytes: &[u8],
    ) -> VisionResult<String> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = capture_name(owner, at, format, attempt);
            match write_new(&dir.join(&name), bytes).await {
                Ok(()) => return Ok(name),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(filename = %name, "Capture name taken, trying next suffix");
                }
                Err(e) => return Err(VisionError::storage("write capture", e)),
            }
        }
        Err(VisionError::StorageUnavailable(format!(
            "no free capture name for {} after {} attempts",
            owner, MAX_NAME_ATTEMPTS
        )))
    }
}

/// Create `path` exclusively and write `bytes`; removes the file on a failed write
async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let written = async {
        file.write_all(bytes).await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        if let Err(cleanup) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %cleanup, "Failed to remove partial artifact");
        }
        return Err(e);
    }
    Ok(())
}

/// Write through a unique temp file and rename over `name`
async fn write_replacing(dir: &Path, name: &str, bytes: &[u8]) -> VisionResult<()> {
    let temp = dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));
    write_new(&temp, bytes)
        .await
        .map_err(|e| VisionError::storage("write artifact", e))?;
    if let Err(e) = tokio::fs::rename(&temp, dir.join(name)).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(VisionError::storage("replace artifact", e));
    }
    Ok(())
}

async fn exists(path: &Path) -> VisionResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| VisionError::storage("inspect artifact", e))
}

async fn modified_at(path: &Path) -> DateTime<Utc> {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}
