//! Mock collaborators for the job tracker

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use oracle_vision::models::ArtifactRef;
use oracle_vision::services::{ImageGenerator, ReadingAttacher};
use oracle_vision::{VisionError, VisionResult};

use super::png_bytes;

/// Image generator with scripted behavior per vision label
///
/// Labels are matched against the prompt text, which always contains the
/// vision label.
pub struct MockGenerator {
    delay: Duration,
    fail_on: HashMap<String, String>,
    hang_on: HashSet<String>,
    garbage_on: HashSet<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockGenerator {
    /// Succeeds immediately for every label
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_on: HashMap::new(),
            hang_on: HashSet::new(),
            garbage_on: HashSet::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Return a provider error for this label
    pub fn failing_on(self, label: &str) -> Self {
        self.failing_with(label, "content policy violation")
    }

    /// Return a provider error carrying `message` for this label
    pub fn failing_with(mut self, label: &str, message: &str) -> Self {
        self.fail_on.insert(label.to_string(), message.to_string());
        self
    }

    /// Never answer for this label
    pub fn hanging_on(mut self, label: &str) -> Self {
        self.hang_on.insert(label.to_string());
        self
    }

    /// Answer with bytes that are not an image
    pub fn garbage_on(mut self, label: &str) -> Self {
        self.garbage_on.insert(label.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous `generate` calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn matches(set: &HashSet<String>, prompt: &str) -> bool {
        set.iter().any(|label| Self::mentions(label, prompt))
    }

    fn mentions(label: &str, prompt: &str) -> bool {
        prompt.contains(&format!("vision of {} ", label))
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> VisionResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if Self::matches(&self.hang_on, prompt) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = self
            .fail_on
            .iter()
            .find(|(label, _)| Self::mentions(label, prompt))
            .map(|(_, message)| message)
        {
            return Err(VisionError::ProviderError(message.clone()));
        }
        if Self::matches(&self.garbage_on, prompt) {
            return Ok(b"<html>not an image</html>".to_vec());
        }
        Ok(png_bytes())
    }
}

/// Attacher that records every call
#[derive(Default)]
pub struct RecordingAttacher {
    calls: Mutex<Vec<AttachCall>>,
}

#[derive(Debug, Clone)]
pub struct AttachCall {
    pub reading_id: String,
    pub owner: String,
    pub images: Vec<ArtifactRef>,
}

impl RecordingAttacher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AttachCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Poll until at least `count` calls were recorded
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> Vec<AttachCall> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let calls = self.calls();
            if calls.len() >= count || tokio::time::Instant::now() >= deadline {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl ReadingAttacher for RecordingAttacher {
    async fn attach_vision_images(
        &self,
        reading_id: &str,
        owner: &str,
        images: &[ArtifactRef],
    ) -> VisionResult<()> {
        self.calls.lock().unwrap().push(AttachCall {
            reading_id: reading_id.to_string(),
            owner: owner.to_string(),
            images: images.to_vec(),
        });
        Ok(())
    }
}
