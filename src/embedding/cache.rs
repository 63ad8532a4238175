use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{EmbeddingProvider, TokenEmbeddings};
use crate::error::ProviderError;

/// Memoizes successful embeddings by exact text.
///
/// Marking schemes are compared against every student answer, so the
/// reference text is embedded once per run instead of once per pair.
/// Failures are never cached. When `capacity` entries are held the cache
/// is cleared before inserting.
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    capacity: usize,
    entries: RwLock<HashMap<String, TokenEmbeddings>>,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, text: &str) -> Option<TokenEmbeddings> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Embedding cache lock was poisoned during lookup, recovering");
                poisoned.into_inner()
            }
        };
        entries.get(text).cloned()
    }

    fn store(&self, text: &str, embeddings: &TokenEmbeddings) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Embedding cache lock was poisoned during insert, recovering");
                poisoned.into_inner()
            }
        };
        if entries.len() >= self.capacity && !entries.contains_key(text) {
            debug!("Embedding cache reached {} entries, clearing", self.capacity);
            entries.clear();
        }
        entries.insert(text.to_string(), embeddings.clone());
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<TokenEmbeddings, ProviderError> {
        if let Some(hit) = self.lookup(text) {
            return Ok(hit);
        }

        let embeddings = self.inner.embed(text).await?;
        self.store(text, &embeddings);
        Ok(embeddings)
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimensions(&self) -> Option<usize> {
        self.inner.dimensions()
    }
}
