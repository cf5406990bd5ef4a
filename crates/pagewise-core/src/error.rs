use thiserror::Error;

use crate::embedding::EmbeddingError;

/// Errors raised while constructing a splitter. Splitting itself never fails.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("invalid splitter configuration: {0}")]
    Config(String),

    #[error("failed to construct embedder: {0}")]
    Embedder(#[from] EmbeddingError),
}
