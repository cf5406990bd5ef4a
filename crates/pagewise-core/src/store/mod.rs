//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the seam between ingestion/answering and
//! whatever holds the embeddings. Indexes are scoped per document: a
//! rebuild replaces everything stored for that document id.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::Chunk;

/// A chunk returned from a similarity query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query, higher is closer.
    pub score: f32,
}

/// Per-document nearest-neighbour index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`rebuild`](VectorIndex::rebuild) | Delete then recreate a document's entries |
/// | [`query`](VectorIndex::query) | Top-k chunks of a document for a text query |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replace every entry of `document_id` with `chunks`, in order.
    async fn rebuild(&self, document_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// Up to `k` chunks of `document_id`, most similar first.
    async fn query(&self, document_id: &str, text: &str, k: usize) -> Result<Vec<ScoredChunk>>;
}
