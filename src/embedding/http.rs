use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingProvider, TokenEmbeddings};
use crate::error::ProviderError;

const PROVIDER: &str = "http-embeddings";

#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    /// Base URL of an OpenAI-compatible API, without the `/embeddings` suffix
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub dimensions: Option<usize>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    client: Client,
    config: HttpEmbeddingConfig,
    endpoint: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: EmbeddingPayload,
}

// Sentence encoders return one vector, token-level servers return one per token
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingPayload {
    Sentence(Vec<f32>),
    Tokens(Vec<Vec<f32>>),
}

impl HttpEmbeddingProvider {
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self, ProviderError> {
        if config.base_url.trim().is_empty() {
            return Err(ProviderError::not_configured(PROVIDER, "EMBEDDING_API_URL is not set"));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::request(PROVIDER, e))?;

        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    fn map_send_error(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout {
                provider: PROVIDER.to_string(),
                after: self.config.timeout,
            }
        } else {
            ProviderError::request(PROVIDER, error)
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<TokenEmbeddings, ProviderError> {
        debug!("Requesting embedding from {} ({} chars)", self.endpoint, text.len());

        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.config.model,
            input: text,
        });
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(PROVIDER, e.to_string()))?;

        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER, "response contained no embeddings"))?;

        let embeddings = match first.embedding {
            EmbeddingPayload::Sentence(vector) => TokenEmbeddings::single(vector),
            EmbeddingPayload::Tokens(rows) => TokenEmbeddings::new(rows),
        };

        if let (Some(expected), Some(actual)) = (self.config.dimensions, embeddings.dimension()) {
            if expected != actual {
                return Err(ProviderError::invalid_response(
                    PROVIDER,
                    format!("expected {}-dimensional vectors, got {}", expected, actual),
                ));
            }
        }

        Ok(embeddings)
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.config.dimensions
    }
}
