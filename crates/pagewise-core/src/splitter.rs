//! The chunking orchestrator.
//!
//! [`TextSplitter::split_text`] resolves a [`SplitPlan`] once per call and
//! then walks a fixed decision list, first match wins:
//!
//! 1. Clean the text ([`clean`]). Empty → no chunks.
//! 2. Legal structure (`§` present and legal mode on) → one `legal` unit per
//!    section.
//! 3. Two or more heading sections → one `hierarchical` unit per non-empty
//!    section body.
//! 4. Otherwise the whole text is one `generic` unit.
//!
//! Every unit then goes through the token-budget gate: a unit within
//! `max_tokens_single` becomes one chunk of the unit's type; a larger unit is
//! split by the plan's strategy and each part labelled `semantic` or
//! `recursive`. Parts under [`MIN_PART_TOKENS`] are dropped.
//!
//! A semantic failure never reaches the caller: the unit is re-split
//! recursively and labelled `recursive`.
//!
//! # Example
//!
//! ```rust
//! use pagewise_core::splitter::{DocumentSplitter, TextSplitter};
//!
//! let splitter = TextSplitter::builder().build().unwrap();
//! let chunks = splitter.split_text("# Title\nSection one.\n## Sub\nSection two.", "doc-1", Some(1));
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].heading.as_deref(), Some("Title"));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::clean::clean;
use crate::embedding::{Embedder, EmbedderCache, EmbeddingError};
use crate::error::SplitError;
use crate::models::{Chunk, ChunkBox, ChunkType, Page};
use crate::strategy::{BreakpointThreshold, RecursiveSplitter, SemanticSplitter, SpanFold};
use crate::structure::{split_by_headings, split_legal_sections, SECTION_MARK};
use crate::tokens::TokenCounter;

/// Strategy parts below this many tokens are noise.
pub const MIN_PART_TOKENS: usize = 3;

/// Splitter settings. Token figures use the splitter's [`TokenCounter`].
#[derive(Debug, Clone, PartialEq)]
pub struct SplitConfig {
    /// Largest unit emitted as a single chunk; also the span budget.
    pub max_tokens_single: usize,
    pub rec_chunk_tokens: usize,
    pub rec_overlap_tokens: usize,
    pub legal_mode: bool,
    pub semantic_mode: bool,
    pub breakpoint: BreakpointThreshold,
    /// Span drafts shorter than this are merged or dropped.
    pub span_min_chars: usize,
    /// Truncate page-level results to this many chunks.
    pub max_chunks: Option<usize>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_tokens_single: 512,
            rec_chunk_tokens: 200,
            rec_overlap_tokens: 25,
            legal_mode: false,
            semantic_mode: false,
            breakpoint: BreakpointThreshold::default(),
            span_min_chars: 40,
            max_chunks: None,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<(), SplitError> {
        if self.max_tokens_single == 0 {
            return Err(SplitError::Config("max_tokens_single must be > 0".into()));
        }
        if self.rec_chunk_tokens < MIN_PART_TOKENS {
            return Err(SplitError::Config(format!(
                "rec_chunk_tokens must be at least {}",
                MIN_PART_TOKENS
            )));
        }
        if self.rec_overlap_tokens >= self.rec_chunk_tokens {
            return Err(SplitError::Config(format!(
                "rec_overlap_tokens ({}) must be less than rec_chunk_tokens ({})",
                self.rec_overlap_tokens, self.rec_chunk_tokens
            )));
        }
        if self.max_chunks == Some(0) {
            return Err(SplitError::Config("max_chunks must be > 0 when set".into()));
        }
        Ok(())
    }
}

/// Structural reading of a cleaned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    Legal,
    HeadingsOrGeneric,
}

/// Strategy for units over the single-chunk budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Semantic,
    Recursive,
}

/// The decision for one `split_text` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPlan {
    pub structure: Structure,
    pub strategy: Strategy,
}

/// Anything that turns document text into identified chunks.
///
/// Only [`split_text`](DocumentSplitter::split_text) is required; the
/// page-level entry points default to composing it.
pub trait DocumentSplitter: Send + Sync {
    fn split_text(&self, text: &str, document_id: &str, page_number: Option<u32>) -> Vec<Chunk>;

    /// Split each page on its own, tagging chunks with the page number.
    fn split_pages(&self, pages: &[Page], document_id: &str) -> Vec<Chunk> {
        pages
            .iter()
            .flat_map(|p| self.split_text(&p.content, document_id, Some(p.page_number)))
            .collect()
    }

    /// Split all pages as one document; chunks carry no page number.
    fn split_pages_combined(&self, pages: &[Page], document_id: &str) -> Vec<Chunk> {
        self.split_text(&join_pages(pages), document_id, None)
    }

    /// Span geometry where available, per-page text otherwise.
    fn split_pages_with_spans(&self, pages: &[Page], document_id: &str) -> Vec<Chunk> {
        self.split_pages(pages, document_id)
    }
}

fn join_pages(pages: &[Page]) -> String {
    pages
        .iter()
        .map(|p| p.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

type EmbedderFactory = Box<dyn FnOnce() -> Result<Arc<dyn Embedder>, EmbeddingError> + Send>;

enum EmbedderSource {
    Ready(Arc<dyn Embedder>),
    Cached {
        cache: Arc<EmbedderCache>,
        model: String,
        build: EmbedderFactory,
    },
}

/// Builder for [`TextSplitter`]. Validation and embedder construction
/// happen in [`build`](SplitterBuilder::build).
#[derive(Default)]
pub struct SplitterBuilder {
    config: SplitConfig,
    counter: Option<TokenCounter>,
    embedder: Option<EmbedderSource>,
}

impl SplitterBuilder {
    pub fn config(mut self, config: SplitConfig) -> Self {
        self.config = config;
        self
    }

    pub fn token_counter(mut self, counter: TokenCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(EmbedderSource::Ready(embedder));
        self
    }

    /// Take the embedder for `model` from `cache`, constructing it with
    /// `build` on a miss. Construction errors fail [`build`](Self::build).
    pub fn cached_embedder<F>(mut self, cache: Arc<EmbedderCache>, model: impl Into<String>, build: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn Embedder>, EmbeddingError> + Send + 'static,
    {
        self.embedder = Some(EmbedderSource::Cached {
            cache,
            model: model.into(),
            build: Box::new(build),
        });
        self
    }

    pub fn build(self) -> Result<TextSplitter, SplitError> {
        self.config.validate()?;
        let counter = self.counter.unwrap_or_default();

        let embedder = match self.embedder {
            None => None,
            Some(EmbedderSource::Ready(e)) => Some(e),
            Some(EmbedderSource::Cached { cache, model, build }) => {
                Some(cache.get_or_try_insert(&model, build)?)
            }
        };

        let semantic = match (self.config.semantic_mode, embedder) {
            (true, Some(e)) => Some(SemanticSplitter::new(e, self.config.breakpoint)),
            (true, None) => {
                tracing::warn!("semantic mode enabled without an embedder; oversized units use recursive splitting");
                None
            }
            (false, _) => None,
        };

        tracing::debug!(
            tokenizer = counter.name(),
            max_tokens_single = self.config.max_tokens_single,
            semantic = semantic.is_some(),
            legal = self.config.legal_mode,
            "text splitter ready"
        );

        Ok(TextSplitter {
            recursive: RecursiveSplitter::new(
                self.config.rec_chunk_tokens,
                self.config.rec_overlap_tokens,
                counter.clone(),
            ),
            spans: SpanFold::new(
                self.config.max_tokens_single,
                self.config.span_min_chars,
                counter.clone(),
            ),
            semantic,
            counter,
            config: self.config,
        })
    }
}

impl fmt::Debug for SplitterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitterBuilder")
            .field("config", &self.config)
            .field("counter", &self.counter)
            .field("embedder", &self.embedder.is_some())
            .finish()
    }
}

/// Configured chunking engine. Immutable and shareable across threads.
#[derive(Debug)]
pub struct TextSplitter {
    config: SplitConfig,
    counter: TokenCounter,
    recursive: RecursiveSplitter,
    semantic: Option<SemanticSplitter>,
    spans: SpanFold,
}

impl TextSplitter {
    pub fn builder() -> SplitterBuilder {
        SplitterBuilder::default()
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Resolve the plan for an already-cleaned text.
    pub fn plan(&self, cleaned: &str) -> SplitPlan {
        let structure = if self.config.legal_mode && cleaned.contains(SECTION_MARK) {
            Structure::Legal
        } else {
            Structure::HeadingsOrGeneric
        };
        let strategy = if self.semantic.is_some() {
            Strategy::Semantic
        } else {
            Strategy::Recursive
        };
        SplitPlan {
            structure,
            strategy,
        }
    }

    fn gate(
        &self,
        plan: SplitPlan,
        body: &str,
        document_id: &str,
        page_number: Option<u32>,
        heading: Option<&str>,
        unit_type: ChunkType,
        out: &mut Vec<Chunk>,
    ) {
        let wrap = |content: &str, chunk_type: ChunkType| {
            Chunk::wrap(&self.counter, content, document_id, page_number, heading, chunk_type, None)
        };

        if self.counter.count(body) <= self.config.max_tokens_single {
            out.extend(wrap(body, unit_type));
            return;
        }

        let (parts, chunk_type) = match (plan.strategy, &self.semantic) {
            (Strategy::Semantic, Some(semantic)) => match semantic.split(body) {
                Ok(groups) => (self.fit_semantic_groups(groups), ChunkType::Semantic),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        document_id,
                        "semantic split failed; falling back to recursive"
                    );
                    (self.recursive.split(body), ChunkType::Recursive)
                }
            },
            _ => (self.recursive.split(body), ChunkType::Recursive),
        };

        let before = out.len();
        out.extend(
            parts
                .iter()
                .filter(|p| self.counter.count(p) >= MIN_PART_TOKENS)
                .filter_map(|p| wrap(p, chunk_type)),
        );
        tracing::trace!(
            parts = parts.len(),
            kept = out.len() - before,
            chunk_type = %chunk_type,
            "split oversized unit"
        );
    }

    /// Re-split semantic groups that are still over the single-chunk budget.
    fn fit_semantic_groups(&self, groups: Vec<String>) -> Vec<String> {
        groups
            .into_iter()
            .flat_map(|g| {
                if self.counter.count(&g) > self.config.max_tokens_single {
                    self.recursive.split(&g)
                } else {
                    vec![g]
                }
            })
            .collect()
    }

    fn cap(&self, mut chunks: Vec<Chunk>) -> Vec<Chunk> {
        if let Some(max) = self.config.max_chunks {
            if chunks.len() > max {
                tracing::debug!(total = chunks.len(), max, "truncating chunks to max_chunks");
                chunks.truncate(max);
            }
        }
        chunks
    }

    fn split_span_page(&self, page: &Page, document_id: &str) -> Vec<Chunk> {
        let spans = page.spans.as_deref().unwrap_or_default();
        self.spans
            .fold(spans)
            .into_iter()
            .filter_map(|draft| {
                Chunk::wrap(
                    &self.counter,
                    &draft.text,
                    document_id,
                    Some(page.page_number),
                    None,
                    ChunkType::BySpans,
                    draft.bbox.map(|b| ChunkBox::from_span_box(b, page.page_number)),
                )
            })
            .collect()
    }
}

impl DocumentSplitter for TextSplitter {
    fn split_text(&self, text: &str, document_id: &str, page_number: Option<u32>) -> Vec<Chunk> {
        let cleaned = clean(text);
        if cleaned.is_empty() {
            return Vec::new();
        }
        let plan = self.plan(&cleaned);
        let mut out = Vec::new();

        if plan.structure == Structure::Legal {
            for section in split_legal_sections(&cleaned) {
                self.gate(
                    plan,
                    &section.text,
                    document_id,
                    page_number,
                    Some(&section.heading),
                    ChunkType::Legal,
                    &mut out,
                );
            }
            return out;
        }

        let sections = split_by_headings(&cleaned);
        if sections.len() >= 2 {
            for section in &sections {
                let body = section.body();
                if body.is_empty() {
                    continue;
                }
                self.gate(
                    plan,
                    &body,
                    document_id,
                    page_number,
                    Some(&section.heading),
                    ChunkType::Hierarchical,
                    &mut out,
                );
            }
            return out;
        }

        self.gate(plan, &cleaned, document_id, page_number, None, ChunkType::Generic, &mut out);
        out
    }

    fn split_pages(&self, pages: &[Page], document_id: &str) -> Vec<Chunk> {
        let chunks = pages
            .iter()
            .flat_map(|p| self.split_text(&p.content, document_id, Some(p.page_number)))
            .collect();
        self.cap(chunks)
    }

    fn split_pages_combined(&self, pages: &[Page], document_id: &str) -> Vec<Chunk> {
        self.cap(self.split_text(&join_pages(pages), document_id, None))
    }

    fn split_pages_with_spans(&self, pages: &[Page], document_id: &str) -> Vec<Chunk> {
        let chunks = pages
            .iter()
            .flat_map(|p| {
                if p.has_spans() {
                    self.split_span_page(p, document_id)
                } else {
                    self.split_text(&p.content, document_id, Some(p.page_number))
                }
            })
            .collect();
        self.cap(chunks)
    }
}
