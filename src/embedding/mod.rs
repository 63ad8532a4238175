//! Embedding backends used by the semantic similarity metric.
//!
//! A provider turns one text into one or more vectors of the same dimension.
//! Contextual encoders return a row per token; sentence encoders return a
//! single row. Either way the caller pools the rows with [`TokenEmbeddings::mean_pool`].

use async_trait::async_trait;

use crate::error::ProviderError;

pub mod cache;
pub mod circuit_breaker;
pub mod hashing;
pub mod http;

pub use cache::CachedEmbeddingProvider;
pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakingProvider, CircuitState};
pub use hashing::HashingEmbeddingProvider;
pub use http::{HttpEmbeddingConfig, HttpEmbeddingProvider};

/// Vectors returned by a provider for one text
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEmbeddings {
    rows: Vec<Vec<f32>>,
}

impl TokenEmbeddings {
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    /// A single sentence-level vector
    pub fn single(vector: Vec<f32>) -> Self {
        Self { rows: vec![vector] }
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Dimension shared by every row, `None` when empty or ragged
    pub fn dimension(&self) -> Option<usize> {
        let first = self.rows.first()?.len();
        self.rows.iter().all(|row| row.len() == first).then_some(first)
    }

    /// Element-wise mean of all rows
    pub fn mean_pool(&self) -> Option<Vec<f64>> {
        let dimension = self.dimension()?;
        if dimension == 0 {
            return None;
        }

        let mut pooled = vec![0.0f64; dimension];
        for row in &self.rows {
            for (sum, value) in pooled.iter_mut().zip(row) {
                *sum += f64::from(*value);
            }
        }

        let count = self.rows.len() as f64;
        for value in &mut pooled {
            *value /= count;
        }
        Some(pooled)
    }
}

/// Cosine of two vectors of equal length; `None` if either has zero norm
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 || !norm_a.is_finite() || !norm_b.is_finite() {
        return None;
    }

    Some((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<TokenEmbeddings, ProviderError>;

    /// Identifier of the model behind this provider, used in logs and cache keys
    fn model_id(&self) -> &str;

    /// Expected vector dimension, if known before the first call
    fn dimensions(&self) -> Option<usize>;
}
