//! Vision generation job tracker
//!
//! `start` registers a job and returns its id immediately. A coordinator task
//! spawns one worker per item; workers share a fixed-size permit pool so at
//! most `max_concurrent` provider calls are in flight across all jobs. Each
//! provider call runs under a hard timeout.
//!
//! Locking: the registry is an `RwLock` over `job id -> Arc<JobEntry>`, and
//! each entry guards its item list with one `Mutex`. Neither lock is ever
//! held across an `.await`, so slow provider calls never block status reads.
//! Lock order when both are taken is registry, then items.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use oracle_common::config::{JobsConfig, ProviderConfig};
use oracle_common::events::{EventBus, OracleEvent};

use crate::error::{VisionError, VisionResult};
use crate::models::artifact::{sanitize_owner, validate_reading_id};
use crate::models::{
    ArtifactKey, ArtifactRef, GenerationContext, ImageFormat, ItemState, JobItems, JobSnapshot,
    JobStatus,
};
use crate::services::artifact_store::{ArtifactStore, ImagePayload};
use crate::services::image_generator::{vision_prompt, ImageGenerator};
use crate::services::reading_attacher::ReadingAttacher;
use crate::services::vision_extractor::MAX_VISIONS;

/// Tracker tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Hard limit on a single provider call
    pub call_timeout: Duration,
    /// How long a completed job stays queryable
    pub retention: Duration,
    /// Provider calls in flight across all jobs
    pub max_concurrent: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from_config(&JobsConfig::default(), &ProviderConfig::default())
    }
}

impl TrackerConfig {
    pub fn from_config(jobs: &JobsConfig, provider: &ProviderConfig) -> Self {
        Self {
            call_timeout: Duration::from_secs(provider.timeout_seconds.max(1)),
            retention: Duration::from_secs(jobs.retention_seconds),
            max_concurrent: jobs.max_concurrent_generations.max(1),
        }
    }
}

struct JobEntry {
    owner: String,
    reading_id: String,
    created_at: DateTime<Utc>,
    items: Mutex<JobItems>,
}

impl JobEntry {
    fn items(&self) -> MutexGuard<'_, JobItems> {
        // Item updates are single assignments; a poisoned guard still holds consistent data
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a terminal outcome; false if the item was already terminal
    fn finish(&self, index: usize, outcome: ItemState) -> bool {
        self.items().finish(index, outcome)
    }

    fn snapshot(&self, job_id: Uuid) -> JobSnapshot {
        let items = self.items();
        JobSnapshot {
            job_id,
            owner: self.owner.clone(),
            reading_id: self.reading_id.clone(),
            status: items.status(),
            items: items.items(),
            created_at: self.created_at,
            completed_at: items.completed_at(),
        }
    }
}

/// Registry and scheduler for generation jobs
pub struct JobTracker {
    jobs: RwLock<HashMap<Uuid, Arc<JobEntry>>>,
    store: Arc<ArtifactStore>,
    generator: Arc<dyn ImageGenerator>,
    attacher: Arc<dyn ReadingAttacher>,
    permits: Semaphore,
    config: TrackerConfig,
    event_bus: EventBus,
}

impl JobTracker {
    pub fn new(
        store: Arc<ArtifactStore>,
        generator: Arc<dyn ImageGenerator>,
        attacher: Arc<dyn ReadingAttacher>,
        event_bus: EventBus,
        config: TrackerConfig,
    ) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            store,
            generator,
            attacher,
            permits: Semaphore::new(config.max_concurrent.max(1)),
            config,
            event_bus,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Register a job and schedule its items
    ///
    /// Returns before any item has been attempted. Fails with
    /// `InvalidArgument` for an empty or oversized vision list, blank or
    /// unusable labels, labels that collide after sanitization, or an
    /// unusable reading id.
    pub fn start(
        self: &Arc<Self>,
        owner: &str,
        reading_id: &str,
        visions: Vec<String>,
        context: GenerationContext,
    ) -> VisionResult<Uuid> {
        let visions = validate_visions(reading_id, visions)?;

        let job_id = Uuid::new_v4();
        let entry = Arc::new(JobEntry {
            owner: sanitize_owner(owner),
            reading_id: reading_id.to_string(),
            created_at: Utc::now(),
            items: Mutex::new(JobItems::new(visions.clone())),
        });

        self.registry_mut().insert(job_id, Arc::clone(&entry));

        info!(
            job_id = %job_id,
            reading_id = %reading_id,
            owner = %entry.owner,
            count = visions.len(),
            "Vision generation job started"
        );
        self.event_bus.emit_lossy(OracleEvent::VisionJobStarted {
            job_id,
            reading_id: reading_id.to_string(),
            visions: visions.clone(),
            timestamp: Utc::now(),
        });

        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            tracker.run_job(job_id, entry, visions, context).await;
        });

        Ok(job_id)
    }

    /// Point-in-time snapshot of a job
    pub fn status(&self, job_id: Uuid) -> VisionResult<JobSnapshot> {
        let entry = self
            .registry()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| VisionError::NotFound(format!("generation job {} not found", job_id)))?;
        Ok(entry.snapshot(job_id))
    }

    /// Jobs with at least one pending item
    pub fn active_jobs(&self) -> usize {
        self.registry()
            .values()
            .filter(|entry| entry.items().status() == JobStatus::Pending)
            .count()
    }

    /// Jobs currently held, finished or not
    pub fn job_count(&self) -> usize {
        self.registry().len()
    }

    /// Drop completed jobs older than the retention window
    pub fn evict_expired(&self) -> usize {
        let cutoff = chrono::Duration::from_std(self.config.retention)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        match cutoff {
            Some(cutoff) => self.evict_finished_before(cutoff),
            None => 0,
        }
    }

    /// Drop jobs that completed before `cutoff`; pending jobs are kept
    pub fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.registry_mut();
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.items().completed_at() {
            Some(completed_at) => completed_at >= cutoff,
            None => true,
        });
        before - jobs.len()
    }

    /// Periodically evict expired jobs
    ///
    /// The task ends on its own once the tracker is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let every = every.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(tracker) = weak.upgrade() else {
                    break;
                };
                let evicted = tracker.evict_expired();
                if evicted > 0 {
                    debug!(evicted, remaining = tracker.job_count(), "Expired generation jobs evicted");
                }
            }
        })
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: Uuid,
        entry: Arc<JobEntry>,
        visions: Vec<String>,
        context: GenerationContext,
    ) {
        let handles: Vec<_> = visions
            .iter()
            .enumerate()
            .map(|(index, label)| {
                let tracker = Arc::clone(&self);
                let entry = Arc::clone(&entry);
                let label = label.clone();
                let context = context.clone();
                tokio::spawn(async move {
                    tracker.run_item(job_id, &entry, index, label, &context).await;
                })
            })
            .collect();

        for (index, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(job_id = %job_id, vision = %visions[index], error = %e, "Vision worker aborted");
                let reason = "generation worker failed".to_string();
                if entry.finish(index, ItemState::Failed { reason: reason.clone() }) {
                    self.event_bus.emit_lossy(OracleEvent::VisionItemFinished {
                        job_id,
                        vision: visions[index].clone(),
                        succeeded: false,
                        filename: None,
                        reason: Some(reason),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        let (succeeded, failed) = {
            let items = entry.items();
            (items.succeeded(), items.failed_count())
        };

        if let Err(e) = self
            .attacher
            .attach_vision_images(&entry.reading_id, &entry.owner, &succeeded)
            .await
        {
            error!(
                job_id = %job_id,
                reading_id = %entry.reading_id,
                error = %e,
                "Failed to attach vision images to reading"
            );
        }

        info!(
            job_id = %job_id,
            reading_id = %entry.reading_id,
            succeeded = succeeded.len(),
            failed,
            "Vision generation job completed"
        );
        self.event_bus.emit_lossy(OracleEvent::VisionJobCompleted {
            job_id,
            reading_id: entry.reading_id.clone(),
            succeeded: succeeded.len(),
            failed,
            timestamp: Utc::now(),
        });
    }

    async fn run_item(
        &self,
        job_id: Uuid,
        entry: &JobEntry,
        index: usize,
        label: String,
        context: &GenerationContext,
    ) {
        let outcome = self.generate_item(entry, &label, context).await;

        let (state, event) = match outcome {
            Ok(artifact) => {
                debug!(job_id = %job_id, vision = %label, filename = %artifact.physical_name, "Vision image generated");
                let event = OracleEvent::VisionItemFinished {
                    job_id,
                    vision: label.clone(),
                    succeeded: true,
                    filename: Some(artifact.physical_name.clone()),
                    reason: None,
                    timestamp: Utc::now(),
                };
                (ItemState::Succeeded { artifact }, event)
            }
            Err(e) => {
                warn!(job_id = %job_id, vision = %label, error = %e, "Vision image generation failed");
                let reason = e.public_message();
                let event = OracleEvent::VisionItemFinished {
                    job_id,
                    vision: label.clone(),
                    succeeded: false,
                    filename: None,
                    reason: Some(reason.clone()),
                    timestamp: Utc::now(),
                };
                (ItemState::Failed { reason }, event)
            }
        };

        if entry.finish(index, state) {
            self.event_bus.emit_lossy(event);
        }
    }

    async fn generate_item(
        &self,
        entry: &JobEntry,
        label: &str,
        context: &GenerationContext,
    ) -> VisionResult<ArtifactRef> {
        let bytes = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| VisionError::ProviderError("generation pool closed".to_string()))?;

            let prompt = vision_prompt(label, context);
            match tokio::time::timeout(self.config.call_timeout, self.generator.generate(&prompt))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(VisionError::Timeout(format!(
                        "{} timed out after {}s",
                        self.generator.name(),
                        self.config.call_timeout.as_secs()
                    )))
                }
            }
        };

        self.store
            .save(
                ImagePayload::Raw(bytes),
                &entry.owner,
                ArtifactKey::Vision {
                    reading_id: entry.reading_id.clone(),
                    label: label.to_string(),
                },
            )
            .await
    }

    fn registry(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, Arc<JobEntry>>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Arc<JobEntry>>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Trim labels and check count, usability and uniqueness of their file names
fn validate_visions(reading_id: &str, visions: Vec<String>) -> VisionResult<Vec<String>> {
    if visions.is_empty() {
        return Err(VisionError::InvalidArgument(
            "at least one vision is required".to_string(),
        ));
    }
    if visions.len() > MAX_VISIONS {
        return Err(VisionError::InvalidArgument(format!(
            "at most {} visions per job (got {})",
            MAX_VISIONS,
            visions.len()
        )));
    }

    validate_reading_id(reading_id)?;

    let mut names = HashSet::new();
    visions
        .into_iter()
        .map(|raw| {
            let label = raw.trim().to_string();
            let name = ArtifactKey::Vision {
                reading_id: reading_id.to_string(),
                label: label.clone(),
            }
            .deterministic_name(ImageFormat::Png)?
            .unwrap_or_default();
            if !names.insert(name) {
                return Err(VisionError::InvalidArgument(format!(
                    "vision '{}' duplicates another vision in this job",
                    label
                )));
            }
            Ok(label)
        })
        .collect()
}
