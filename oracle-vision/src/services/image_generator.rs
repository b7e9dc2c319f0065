//! Image generation provider client
//!
//! `ImageGenerator` is the seam between the job tracker and the external
//! provider. The production implementation talks to an OpenAI-compatible
//! `/v1/images/generations` endpoint and asks for `b64_json` responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use oracle_common::config::ProviderConfig;

use crate::error::{VisionError, VisionResult};
use crate::models::{GenerationContext, ImageFormat};
use crate::services::artifact_store::decode_base64_image;

const USER_AGENT: &str = concat!("oracle-vision/", env!("CARGO_PKG_VERSION"));

/// Longest reading excerpt fed into a prompt, in characters
const MAX_EXCERPT_CHARS: usize = 300;

/// External image generation collaborator
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Provider identifier for logs
    fn name(&self) -> &str;

    /// Generate one image and return its raw bytes
    ///
    /// Implementations return `ProviderError` for every failure mode
    /// (network, non-success status, malformed body).
    async fn generate(&self, prompt: &str) -> VisionResult<Vec<u8>>;
}

/// Build the prompt for one vision
pub fn vision_prompt(label: &str, context: &GenerationContext) -> String {
    let mut prompt = format!(
        "A mystical vision of {} revealed within the flames of a sacred fire. \
         Painterly, luminous, dreamlike; glowing embers and drifting smoke frame \
         the vision. Warm firelight palette, soft edges, no text or lettering.",
        label.trim()
    );

    if let Some(excerpt) = context
        .reading_excerpt
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        let excerpt: String = excerpt.chars().take(MAX_EXCERPT_CHARS).collect();
        prompt.push_str(&format!(" The seer described it: \"{}\".", excerpt));
    }
    if context.fire_image_filename.is_some() {
        prompt.push_str(" The scene echoes the shapes of a real fire photographed by the seeker.");
    }

    prompt
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    b64_json: Option<String>,
    url: Option<String>,
}

/// OpenAI-compatible image client
pub struct OpenAiImageClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    size: String,
    api_key: Option<String>,
}

impl OpenAiImageClient {
    pub fn new(config: &ProviderConfig) -> VisionResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| VisionError::ProviderError(format!("HTTP client setup failed: {}", e)))?;

        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            tracing::warn!("No image provider API key configured; vision generation will fail");
        }

        Ok(Self {
            http_client,
            endpoint: format!(
                "{}/v1/images/generations",
                config.base_url.trim_end_matches('/')
            ),
            model: config.model.clone(),
            size: config.size.clone(),
            api_key,
        })
    }

    async fn download(&self, url: &str) -> VisionResult<Vec<u8>> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| VisionError::ProviderError(format!("image download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(VisionError::ProviderError(format!(
                "image download returned {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| VisionError::ProviderError(format!("image download failed: {}", e)))
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> VisionResult<Vec<u8>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| VisionError::ProviderError("no API key configured".to_string()))?;

        let request = GenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: &self.size,
            response_format: "b64_json",
        };

        tracing::debug!(model = %self.model, size = %self.size, "Requesting image generation");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VisionError::ProviderError(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Image provider returned an error");
            return Err(VisionError::ProviderError(format!(
                "provider returned {}",
                status
            )));
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| VisionError::ProviderError(format!("malformed response: {}", e)))?;

        let image = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| VisionError::ProviderError("response contained no images".to_string()))?;

        let bytes = match (image.b64_json, image.url) {
            (Some(encoded), _) => decode_base64_image(&encoded)
                .map_err(|e| VisionError::ProviderError(format!("malformed image data: {}", e)))?,
            (None, Some(url)) => self.download(&url).await?,
            (None, None) => {
                return Err(VisionError::ProviderError(
                    "response image has neither data nor url".to_string(),
                ))
            }
        };

        ImageFormat::detect(&bytes)
            .map_err(|e| VisionError::ProviderError(format!("provider returned {}", e)))?;

        Ok(bytes)
    }
}
