use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::embedding::{Embedder, EmbeddingError};

/// Embedding wrapper with an in-process vector cache.
///
/// Scoring embeds each mentee's text once per mentor; with a deterministic
/// embedder the cache answers every repeat. Only texts missing from the cache
/// are sent to the inner embedder, in one batch.
pub struct CachedEmbedder<E> {
    inner: E,
    cache: moka::future::Cache<String, Arc<Vec<f32>>>,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E, max_entries: u64, ttl_secs: u64) -> Self {
        let cache = moka::future::CacheBuilder::new(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, cache }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.entry_count(),
        }
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachedEmbedder<E> {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut resolved: Vec<Option<Arc<Vec<f32>>>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<String> = Vec::new();

        for text in texts {
            let hit = self.cache.get(&CacheKey::embedding(text)).await;
            if hit.is_none() && !misses.contains(text) {
                misses.push(text.clone());
            }
            resolved.push(hit);
        }

        let mut fresh: HashMap<String, Arc<Vec<f32>>> = HashMap::with_capacity(misses.len());
        if !misses.is_empty() {
            tracing::trace!("Embedding cache miss for {} of {} texts", misses.len(), texts.len());
            let vectors = self.inner.encode(&misses).await?;
            if vectors.len() != misses.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    misses.len(),
                    vectors.len()
                )));
            }
            for (text, vector) in misses.into_iter().zip(vectors) {
                let vector = Arc::new(vector);
                self.cache
                    .insert(CacheKey::embedding(&text), vector.clone())
                    .await;
                fresh.insert(text, vector);
            }
        }

        let mut out = Vec::with_capacity(texts.len());
        for (text, hit) in texts.iter().zip(resolved) {
            let vector = hit
                .or_else(|| fresh.get(text).cloned())
                .ok_or_else(|| EmbeddingError::InvalidResponse(format!("no embedding for {:?}", text)))?;
            out.push(vector.as_ref().clone());
        }
        Ok(out)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Build a cache key for one embedded text
    pub fn embedding(text: &str) -> String {
        format!("emb:{}", text)
    }
}
