//! In-memory vector storage.
//!
//! Uses a `HashMap` of per-document entries behind `std::sync::RwLock`.
//! Search is brute-force cosine similarity over one document's vectors.
//! Embedding happens elsewhere; this type only stores and ranks vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::Chunk;

use super::ScoredChunk;

struct StoredEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct MemoryIndexStore {
    documents: RwLock<HashMap<String, Vec<StoredEntry>>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all entries of `document_id`. An empty `entries` removes the document.
    pub fn replace(&self, document_id: &str, entries: Vec<(Chunk, Vec<f32>)>) {
        let mut docs = self.documents.write().unwrap();
        if entries.is_empty() {
            docs.remove(document_id);
            return;
        }
        let stored = entries
            .into_iter()
            .map(|(chunk, vector)| StoredEntry { chunk, vector })
            .collect();
        docs.insert(document_id.to_string(), stored);
    }

    pub fn remove(&self, document_id: &str) -> bool {
        self.documents.write().unwrap().remove(document_id).is_some()
    }

    /// Number of chunks stored for `document_id`.
    pub fn len(&self, document_id: &str) -> usize {
        self.documents
            .read()
            .unwrap()
            .get(document_id)
            .map_or(0, Vec::len)
    }

    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.documents.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Top `k` chunks of `document_id` by cosine similarity to `query`.
    pub fn search(&self, document_id: &str, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let docs = self.documents.read().unwrap();
        let Some(entries) = docs.get(document_id) else {
            return Vec::new();
        };
        let mut scored: Vec<ScoredChunk> = entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}
