//! Embedding-backed vector index.
//!
//! [`EmbeddingIndex`] implements the core [`VectorIndex`] over
//! [`MemoryIndexStore`]. Embedding calls are blocking, so they run on
//! `tokio::task::spawn_blocking`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use pagewise_core::embedding::Embedder;
use pagewise_core::store::memory::MemoryIndexStore;
use pagewise_core::store::{ScoredChunk, VectorIndex};
use pagewise_core::Chunk;

#[derive(Clone)]
pub struct EmbeddingIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<MemoryIndexStore>,
}

impl EmbeddingIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_store(embedder, Arc::new(MemoryIndexStore::new()))
    }

    pub fn with_store(embedder: Arc<dyn Embedder>, store: Arc<MemoryIndexStore>) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &Arc<MemoryIndexStore> {
        &self.store
    }
}

#[async_trait]
impl VectorIndex for EmbeddingIndex {
    async fn rebuild(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            self.store.remove(document_id);
            return Ok(());
        }

        let embedder = self.embedder.clone();
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_documents(&texts))
            .await
            .context("embedding task panicked")?
            .with_context(|| format!("Failed to embed chunks of {}", document_id))?;

        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let entries = chunks.iter().cloned().zip(vectors).collect();
        self.store.replace(document_id, entries);
        tracing::info!(document_id, chunks = chunks.len(), model = self.embedder.model_name(), "index rebuilt");
        Ok(())
    }

    async fn query(&self, document_id: &str, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let embedder = self.embedder.clone();
        let query = text.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_query(&query))
            .await
            .context("embedding task panicked")?
            .context("Failed to embed query")?;

        Ok(self.store.search(document_id, &vector, k))
    }
}
