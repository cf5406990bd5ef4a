//! Embedder trait, embedder cache, and vector utilities.
//!
//! The engine only ever sees [`Embedder`]; concrete providers (OpenAI,
//! Ollama, fastembed) live in the `pagewise` app crate. Calls are
//! synchronous: the app runs the engine on blocking threads.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedder configuration error: {0}")]
    Config(String),
}

/// A text embedding backend.
pub trait Embedder: Send + Sync {
    /// Model identifier, also the key under which the embedder is cached.
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, one vector per input, in input order.
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single query. Providers with asymmetric query encoders
    /// override this.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_documents(&[text.to_string()])?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: vectors.len() + 1,
            }),
        }
    }
}

/// Process-wide embedder instances keyed by model name.
///
/// Read-mostly: lookups take the read lock; a miss builds the embedder
/// outside any lock and inserts it. Two racing builders for the same key
/// both succeed and the first insert wins.
#[derive(Default)]
pub struct EmbedderCache {
    entries: RwLock<HashMap<String, Arc<dyn Embedder>>>,
}

impl EmbedderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Embedder>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Return the cached embedder for `key`, building it with `build` on a miss.
    pub fn get_or_try_insert<E>(
        &self,
        key: &str,
        build: impl FnOnce() -> Result<Arc<dyn Embedder>, E>,
    ) -> Result<Arc<dyn Embedder>, E> {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let built = build()?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(key.to_string()).or_insert(built);
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EmbedderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("EmbedderCache").field("models", &keys).finish()
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(&'static str);

    impl Embedder for Fixed {
        fn model_name(&self) -> &str {
            self.0
        }

        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_embed_query_defaults_to_documents() {
        let v = Fixed("m").embed_query("abc").unwrap();
        assert_eq!(v, vec![3.0, 1.0]);
    }

    #[test]
    fn test_cache_builds_once_per_key() {
        let cache = EmbedderCache::new();
        let builds = AtomicUsize::new(0);
        for _ in 0..3 {
            let e = cache
                .get_or_try_insert::<EmbeddingError>("m", || {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(Fixed("m")))
                })
                .unwrap();
            assert_eq!(e.model_name(), "m");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_does_not_store_failures() {
        let cache = EmbedderCache::new();
        let err = cache.get_or_try_insert("m", || Err(EmbeddingError::Config("no key".into())));
        assert!(err.is_err());
        assert!(cache.is_empty());
    }
}
