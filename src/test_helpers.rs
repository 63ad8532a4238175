/*!
 * Test Helpers and Utilities
 *
 * Builders for configurations and stub providers with sensible defaults.
 * Tests can modify the returned objects as needed.
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, EmbeddingBackend};
use crate::embedding::{EmbeddingProvider, HashingEmbeddingProvider, TokenEmbeddings};
use crate::error::ProviderError;
use crate::extraction::{ImageBackend, PromptProfile};
use crate::scoring::{AggregatorConfig, MetricKind, ScoreAggregator};

/// Creates a test configuration with sensible defaults
/// All fields are populated to avoid compilation errors when new fields are added
pub fn create_test_config() -> Config {
    Config {
        // Embeddings: local and deterministic
        embedding_backend: EmbeddingBackend::Hashing,
        embedding_api_url: None,
        embedding_api_key: None,
        embedding_model: "all-MiniLM-L6-v2".to_string(),
        embedding_dimensions: 256,
        embedding_timeout_seconds: 5,
        embedding_cache_capacity: 64,
        embedding_failure_threshold: 3,
        embedding_recovery_seconds: 1,

        // Scoring
        scoring_metrics: MetricKind::ALL.to_vec(),
        scoring_weights: None,
        bleu_max_order: 4,
        bleu_smoothing_epsilon: None,
        rouge_use_stemmer: true,
        drop_illegible_markers: true,
        batch_concurrency: 2,

        // Extraction (no remote vision endpoint in tests)
        vision_api_url: None,
        vision_api_key: None,
        vision_model: "llama-3.2-90b-vision-preview".to_string(),
        vision_prompt: PromptProfile::Handwritten,
        vision_temperature: 0.3,
        vision_max_tokens: 2048,
        vision_top_p: 0.9,
        image_backend: ImageBackend::Vision,
        ocr_language: "eng".to_string(),
        pdf_ocr_fallback: true,
        pdftotext_path: "pdftotext".to_string(),
        ocrmypdf_path: "ocrmypdf".to_string(),
        extraction_timeout_seconds: 30,
    }
}

/// Aggregator over every metric with the local hashing encoder
pub fn create_test_aggregator() -> ScoreAggregator {
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(HashingEmbeddingProvider::new(256).expect("256 dimensions is valid"));
    ScoreAggregator::new(AggregatorConfig::default(), Some(provider))
}

/// Provider whose every call fails, counting the attempts
#[derive(Debug, Default)]
pub struct FailingEmbeddingProvider {
    calls: AtomicUsize,
}

impl FailingEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<TokenEmbeddings, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Http {
            provider: "failing-embeddings".to_string(),
            status: 503,
            body: "service unavailable".to_string(),
        })
    }

    fn model_id(&self) -> &str {
        "failing-embeddings"
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }
}

/// Provider that never answers within any reasonable timeout
#[derive(Debug)]
pub struct StalledEmbeddingProvider {
    pub delay: Duration,
}

#[async_trait]
impl EmbeddingProvider for StalledEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<TokenEmbeddings, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(TokenEmbeddings::single(vec![1.0]))
    }

    fn model_id(&self) -> &str {
        "stalled-embeddings"
    }

    fn dimensions(&self) -> Option<usize> {
        Some(1)
    }
}
