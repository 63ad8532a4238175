use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{MetricKind, NormalizedText};
use crate::embedding::{cosine_similarity, EmbeddingProvider, TokenEmbeddings};
use crate::error::{MetricUnavailable, ProviderError};

pub const DEFAULT_SEMANTIC_TIMEOUT: Duration = Duration::from_secs(10);

/// Cosine similarity of mean-pooled embeddings from an [`EmbeddingProvider`]
#[derive(Clone)]
pub struct SemanticSimilarityScorer {
    provider: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl SemanticSimilarityScorer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Cosine in [-1, 1]; both texts are embedded concurrently under one timeout
    pub async fn similarity(
        &self,
        reference: &NormalizedText,
        candidate: &NormalizedText,
    ) -> Result<f64, MetricUnavailable> {
        if reference.is_empty() || candidate.is_empty() {
            return Err(unavailable("cannot embed empty text"));
        }

        let embed_both = async {
            tokio::join!(
                self.provider.embed(&reference.text),
                self.provider.embed(&candidate.text)
            )
        };

        let (reference_embeddings, candidate_embeddings) = tokio::time::timeout(self.timeout, embed_both)
            .await
            .map_err(|_| {
                MetricUnavailable::from_provider(
                    MetricKind::Semantic,
                    &ProviderError::Timeout {
                        provider: self.provider.model_id().to_string(),
                        after: self.timeout,
                    },
                )
            })?;

        let reference_vector = pool("reference", reference_embeddings.map_err(provider_failure)?)?;
        let candidate_vector = pool("candidate", candidate_embeddings.map_err(provider_failure)?)?;

        if reference_vector.len() != candidate_vector.len() {
            return Err(unavailable(format!(
                "embedding dimension mismatch: reference {} vs candidate {}",
                reference_vector.len(),
                candidate_vector.len()
            )));
        }

        let cosine = cosine_similarity(&reference_vector, &candidate_vector)
            .ok_or_else(|| unavailable("embedding has zero norm"))?;

        debug!("Semantic similarity via {}: {:.4}", self.provider.model_id(), cosine);
        Ok(cosine)
    }
}

fn unavailable(reason: impl Into<String>) -> MetricUnavailable {
    MetricUnavailable::new(MetricKind::Semantic, reason)
}

fn provider_failure(error: ProviderError) -> MetricUnavailable {
    MetricUnavailable::from_provider(MetricKind::Semantic, &error)
}

fn pool(side: &str, embeddings: TokenEmbeddings) -> Result<Vec<f64>, MetricUnavailable> {
    if embeddings.is_empty() {
        return Err(unavailable(format!("provider returned no vectors for the {}", side)));
    }
    embeddings
        .mean_pool()
        .ok_or_else(|| unavailable(format!("provider returned ragged or empty vectors for the {}", side)))
}
