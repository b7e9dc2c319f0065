//! Vision generation job state
//!
//! A job owns a fixed, ordered list of items. Each item moves exactly once
//! from `Pending` to a terminal state (`Succeeded` or `Failed`). The overall
//! status is derived: `Pending` while any item is pending, `Completed` once
//! all are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::ArtifactRef;

/// Context shared by every item of a job, fed into the prompt template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationContext {
    /// Fire image the reading was cast from
    pub fire_image_filename: Option<String>,
    /// Short excerpt of the reading text
    pub reading_excerpt: Option<String>,
}

/// Per-item state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ItemState {
    Pending,
    Succeeded { artifact: ArtifactRef },
    Failed { reason: String },
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemState::Pending)
    }
}

/// Derived job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// At least one item still pending
    Pending,
    /// Every item terminal
    Completed,
}

/// Mutable portion of a job, guarded as one unit by the tracker
#[derive(Debug, Clone)]
pub struct JobItems {
    visions: Vec<String>,
    states: Vec<ItemState>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobItems {
    /// All items start pending
    pub fn new(visions: Vec<String>) -> Self {
        let states = vec![ItemState::Pending; visions.len()];
        Self {
            visions,
            states,
            completed_at: None,
        }
    }

    /// Move an item to a terminal state
    ///
    /// Returns `false` (and leaves the item untouched) if the index is out of
    /// range, the item is already terminal, or `outcome` is `Pending`.
    pub fn finish(&mut self, index: usize, outcome: ItemState) -> bool {
        if !outcome.is_terminal() {
            return false;
        }
        match self.states.get_mut(index) {
            Some(state) if !state.is_terminal() => {
                *state = outcome;
                if self.completed_at.is_none() && self.states.iter().all(ItemState::is_terminal) {
                    self.completed_at = Some(Utc::now());
                }
                true
            }
            _ => false,
        }
    }

    pub fn status(&self) -> JobStatus {
        if self.states.iter().all(ItemState::is_terminal) {
            JobStatus::Completed
        } else {
            JobStatus::Pending
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Succeeded artifacts in request order
    pub fn succeeded(&self) -> Vec<ArtifactRef> {
        self.states
            .iter()
            .filter_map(|state| match state {
                ItemState::Succeeded { artifact } => Some(artifact.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| matches!(s, ItemState::Failed { .. }))
            .count()
    }

    /// Point-in-time copy of every item, in request order
    pub fn items(&self) -> Vec<ItemSnapshot> {
        self.visions
            .iter()
            .zip(self.states.iter())
            .map(|(vision, state)| ItemSnapshot {
                vision: vision.clone(),
                state: state.clone(),
            })
            .collect()
    }
}

/// One item as seen by a status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub vision: String,
    #[serde(flatten)]
    pub state: ItemState,
}

/// Consistent view of a job at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub owner: String,
    pub reading_id: String,
    pub status: JobStatus,
    pub items: Vec<ItemSnapshot>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &ArtifactRef)> {
        self.items.iter().filter_map(|item| match &item.state {
            ItemState::Succeeded { artifact } => Some((item.vision.as_str(), artifact)),
            _ => None,
        })
    }

    pub fn count_pending(&self) -> usize {
        self.items
            .iter()
            .filter(|i| !i.state.is_terminal())
            .count()
    }
}
