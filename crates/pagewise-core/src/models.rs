//! Core data models shared by the chunking engine and its collaborators.
//!
//! [`Page`]s and [`Span`]s are immutable inputs produced by a page-text
//! provider. [`Chunk`]s are produced by the splitter and are immutable once
//! wrapped: the only way to build one is [`Chunk::wrap`], which computes the
//! token count and the deterministic chunk id in one step.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::make_chunk_id;
use crate::tokens::TokenCounter;

/// Which strategy produced a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Generic,
    Hierarchical,
    Legal,
    Semantic,
    Recursive,
    BySpans,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Generic => "generic",
            ChunkType::Hierarchical => "hierarchical",
            ChunkType::Legal => "legal",
            ChunkType::Semantic => "semantic",
            ChunkType::Recursive => "recursive",
            ChunkType::BySpans => "by_spans",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounding box of a single span, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpanBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SpanBox {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &SpanBox) -> SpanBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        SpanBox {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }
}

/// Bounding region of a span-derived chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub page: u32,
}

impl ChunkBox {
    pub fn from_span_box(b: SpanBox, page: u32) -> Self {
        Self {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
            page,
        }
    }
}

/// Atomic text fragment with optional geometry, in page-local reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    #[serde(default)]
    pub bbox: Option<SpanBox>,
}

/// One page of extracted text as produced by a page-text provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-based, unique within a document.
    pub page_number: u32,
    pub content: String,
    #[serde(default)]
    pub spans: Option<Vec<Span>>,
    #[serde(default)]
    pub ocr_used: bool,
}

impl Page {
    pub fn new(page_number: u32, content: impl Into<String>) -> Self {
        Self {
            page_number,
            content: content.into(),
            spans: None,
            ocr_used: false,
        }
    }

    pub fn with_spans(mut self, spans: Vec<Span>) -> Self {
        self.spans = Some(spans);
        self
    }

    pub fn has_spans(&self) -> bool {
        self.spans.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// The unit of retrieval: a slice of document text with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub content: String,
    pub document_id: String,
    pub page_number: Option<u32>,
    pub heading: Option<String>,
    pub chunk_type: ChunkType,
    pub token_count: usize,
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<ChunkBox>,
}

impl Chunk {
    /// Build a fully-formed chunk: token count and chunk id are derived here
    /// and never recomputed afterwards.
    ///
    /// Returns `None` if `content` is blank after trimming.
    pub fn wrap(
        counter: &TokenCounter,
        content: &str,
        document_id: &str,
        page_number: Option<u32>,
        heading: Option<&str>,
        chunk_type: ChunkType,
        bbox: Option<ChunkBox>,
    ) -> Option<Chunk> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        let chunk_id = make_chunk_id(document_id, page_number, heading, chunk_type, content);
        Some(Chunk {
            content: content.to_string(),
            document_id: document_id.to_string(),
            page_number,
            heading: heading.map(str::to_string),
            chunk_type,
            token_count: counter.count(content),
            chunk_id,
            bbox,
        })
    }
}
