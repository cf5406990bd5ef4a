//! # Pagewise Core
//!
//! The document chunking engine behind Pagewise: data models, token
//! counting, boilerplate cleaning, structure detection, deterministic chunk
//! identity, the recursive / semantic / span strategies, the
//! [`TextSplitter`](splitter::TextSplitter) orchestrator, and the embedder
//! and vector-index seams.
//!
//! This crate is synchronous and performs no I/O. It contains no tokio,
//! HTTP client, or filesystem code; those live in the `pagewise` app crate.

pub mod clean;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod models;
pub mod splitter;
pub mod store;
pub mod strategy;
pub mod structure;
pub mod tokens;

pub use error::SplitError;
pub use models::{Chunk, ChunkBox, ChunkType, Page, Span, SpanBox};
pub use splitter::{DocumentSplitter, SplitConfig, TextSplitter};
pub use tokens::TokenCounter;
