use std::path::Path;
use std::time::Duration;

use base64ct::{Base64, Encoding};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{PromptProfile, SourceKind};
use crate::error::ProviderError;

const PROVIDER: &str = "vision";

/// Largest image sent inline; base64 grows it by a third
const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub prompt: PromptProfile,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub timeout: Duration,
}

/// Transcribes page images through a vision-capable chat-completions endpoint
#[derive(Debug, Clone)]
pub struct VisionExtractor {
    client: Client,
    config: VisionConfig,
    endpoint: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<serde_json::Value>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl VisionExtractor {
    pub fn new(config: VisionConfig) -> Result<Self, ProviderError> {
        if config.api_url.trim().is_empty() {
            return Err(ProviderError::not_configured(PROVIDER, "VISION_API_URL is not set"));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::request(PROVIDER, e))?;
        let endpoint = format!("{}/chat/completions", config.api_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub async fn extract_image(&self, path: &Path) -> Result<String, ProviderError> {
        let source_name = path.display().to_string();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ProviderError::io(&source_name, e))?;
        if metadata.len() > MAX_IMAGE_BYTES {
            return Err(ProviderError::Unsupported {
                path: source_name,
                details: format!(
                    "image is {:.1} MB, larger than the {:.0} MB inline limit",
                    metadata.len() as f64 / (1024.0 * 1024.0),
                    MAX_IMAGE_BYTES as f64 / (1024.0 * 1024.0)
                ),
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ProviderError::io(&source_name, e))?;
        let image_url = format!(
            "data:{};base64,{}",
            SourceKind::image_mime_type(path),
            Base64::encode_string(&bytes)
        );

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": self.config.prompt.text() },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]
            })],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            stream: false,
        };

        debug!(
            "Sending {} ({} bytes) to {} with {} prompt",
            source_name,
            bytes.len(),
            self.config.model,
            self.config.prompt
        );

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: PROVIDER.to_string(),
                    after: self.config.timeout,
                }
            } else {
                ProviderError::request(PROVIDER, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(PROVIDER, e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER, "response contained no message content"))?;

        info!("Transcribed {} ({} chars)", source_name, text.len());
        Ok(text.trim().to_string())
    }
}
