//! # Pagewise
//!
//! Page-aware document chunking, embedding, and question answering.
//!
//! Pagewise extracts the pages of a PDF (or pre-extracted text), splits them
//! into retrieval chunks with the [`pagewise_core`] engine, embeds the chunks
//! into a per-document vector index, and answers questions from the closest
//! chunks through an LLM. Everything is exposed through a CLI and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ PageSource  │──▶│ TextSplitter │──▶│ VectorIndex  │
//! │ PDF/TXT/JSON│   │ (core crate) │   │ embed + kNN  │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                      ┌──────────────────────┤
//!                      ▼                      ▼
//!                 ┌──────────┐          ┌──────────┐
//!                 │   CLI    │          │   HTTP   │
//!                 │(pagewise)│          │  (axum)  │
//!                 └──────────┘          └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`embedding`] | OpenAI / Ollama / fastembed embedders |
//! | [`extract`] | Page sources and the page report |
//! | [`index`] | Embedding-backed in-memory vector index |
//! | [`ingest`] | Ingestion pipeline and report |
//! | [`answer`] | Retrieval-augmented question answering |
//! | [`services`] | Config-to-component wiring |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod server;
pub mod services;
