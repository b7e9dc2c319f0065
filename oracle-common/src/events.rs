//! Event types for the Oracle event system
//!
//! Provides shared event definitions and the EventBus used for SSE fan-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Oracle event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum OracleEvent {
    /// A fire image was captured and stored under a temporary name
    FireImageCaptured {
        owner: String,
        filename: String,
        timestamp: DateTime<Utc>,
    },

    /// A captured fire image was bound to a reading
    FireImagePromoted {
        reading_id: String,
        filename: String,
        timestamp: DateTime<Utc>,
    },

    /// A vision-image generation job was accepted
    VisionJobStarted {
        job_id: Uuid,
        reading_id: String,
        visions: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// One vision item reached a terminal state
    ///
    /// `filename` is set on success, `reason` on failure.
    VisionItemFinished {
        job_id: Uuid,
        vision: String,
        succeeded: bool,
        filename: Option<String>,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Every item of a job reached a terminal state
    VisionJobCompleted {
        job_id: Uuid,
        reading_id: String,
        succeeded: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl OracleEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            OracleEvent::FireImageCaptured { .. } => "FireImageCaptured",
            OracleEvent::FireImagePromoted { .. } => "FireImagePromoted",
            OracleEvent::VisionJobStarted { .. } => "VisionJobStarted",
            OracleEvent::VisionItemFinished { .. } => "VisionItemFinished",
            OracleEvent::VisionJobCompleted { .. } => "VisionJobCompleted",
        }
    }

    /// Whether the event belongs to the vision job lifecycle
    pub fn is_vision_event(&self) -> bool {
        matches!(
            self,
            OracleEvent::VisionJobStarted { .. }
                | OracleEvent::VisionItemFinished { .. }
                | OracleEvent::VisionJobCompleted { .. }
        )
    }
}

/// Central event distribution bus
///
/// Cloning is cheap; all clones share one broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OracleEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<OracleEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Returns the number of subscribers the event reached.
    pub fn emit_lossy(&self, event: OracleEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
