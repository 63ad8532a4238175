use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{EmbeddingProvider, TokenEmbeddings};
use crate::error::ProviderError;

/// Deterministic local encoder that needs no model download or network.
///
/// Each token is hashed with SHA-256 into a signed one-hot vector of
/// `dimensions` entries, plus a half-weight entry for each of its character
/// trigrams so that inflected forms ("deploy", "deployment") land close to
/// each other. One row is returned per token.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
    model_id: String,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Result<Self, ProviderError> {
        if dimensions == 0 {
            return Err(ProviderError::not_configured(
                "hashing-embeddings",
                "embedding dimension must be at least 1",
            ));
        }
        Ok(Self {
            dimensions,
            model_id: format!("sha256-hashing-{}", dimensions),
        })
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(index_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    fn token_vector(&self, token: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let (index, sign) = self.bucket(token);
        vector[index] += sign;

        let padded: Vec<char> = format!("<{}>", token).chars().collect();
        if padded.len() > 3 {
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                let (index, sign) = self.bucket(&trigram);
                vector[index] += 0.5 * sign;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<TokenEmbeddings, ProviderError> {
        let rows = text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|token| !token.is_empty())
            .map(|token| self.token_vector(&token.to_lowercase()))
            .collect();
        Ok(TokenEmbeddings::new(rows))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }
}
