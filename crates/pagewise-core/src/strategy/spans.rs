//! Span-geometry chunk assembly for a single page.
//!
//! Spans are folded left to right into `(drafts, buffer)`:
//!
//! - **accumulating**: the span fits the budget next to the buffer and is
//!   appended to it.
//! - **flushing-normal**: the span would push the buffer over budget, so the
//!   buffer is flushed first and the span starts a new buffer.
//! - **flushing-oversized**: the span alone exceeds the budget. The buffer is
//!   flushed and the span becomes its own draft.
//! - **merging-micro-chunk**: a flushed buffer shorter than `min_chars`
//!   characters is appended to the previous draft if the result stays within
//!   120% of the budget, and dropped otherwise.
//!
//! The end of the span sequence triggers a final flush.

use crate::models::{Span, SpanBox};
use crate::tokens::TokenCounter;

/// A page-local chunk before it is wrapped into a [`Chunk`](crate::models::Chunk).
#[derive(Debug, Clone, PartialEq)]
pub struct SpanDraft {
    pub text: String,
    pub bbox: Option<SpanBox>,
    pub tokens: usize,
    /// Single span over budget; never merged into.
    pub oversized: bool,
}

#[derive(Debug, Default)]
struct FoldState<'a> {
    drafts: Vec<SpanDraft>,
    buffer: Vec<&'a Span>,
    buffer_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct SpanFold {
    budget: usize,
    min_chars: usize,
    counter: TokenCounter,
}

impl SpanFold {
    pub fn new(budget: usize, min_chars: usize, counter: TokenCounter) -> Self {
        Self {
            budget: budget.max(1),
            min_chars,
            counter,
        }
    }

    /// Largest token count a micro-chunk merge may produce.
    fn merge_cap(&self) -> usize {
        self.budget + self.budget / 5
    }

    /// Fold one page's spans into drafts, in reading order.
    pub fn fold(&self, spans: &[Span]) -> Vec<SpanDraft> {
        let state = spans
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .fold(FoldState::default(), |state, span| self.step(state, span));
        self.flush_into(state).drafts
    }

    fn step<'a>(&self, state: FoldState<'a>, span: &'a Span) -> FoldState<'a> {
        let tokens = self.counter.count(span.text.trim());

        if tokens > self.budget {
            let mut state = self.flush_into(state);
            state.drafts.push(SpanDraft {
                text: span.text.trim().to_string(),
                bbox: span.bbox,
                tokens,
                oversized: true,
            });
            return state;
        }

        let mut state = if !state.buffer.is_empty() && state.buffer_tokens + tokens > self.budget {
            self.flush_into(state)
        } else {
            state
        };
        state.buffer.push(span);
        state.buffer_tokens += tokens;
        state
    }

    /// Turn a buffer into a draft: texts joined with single spaces, boxes
    /// unioned. `None` for an empty buffer.
    pub fn flush(&self, buffer: &[&Span]) -> Option<SpanDraft> {
        let text = buffer
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            return None;
        }
        let bbox = buffer
            .iter()
            .filter_map(|s| s.bbox)
            .reduce(|acc, b| acc.union(&b));
        Some(SpanDraft {
            tokens: self.counter.count(&text),
            text,
            bbox,
            oversized: false,
        })
    }

    fn flush_into<'a>(&self, mut state: FoldState<'a>) -> FoldState<'a> {
        let buffer = std::mem::take(&mut state.buffer);
        state.buffer_tokens = 0;
        if let Some(draft) = self.flush(&buffer) {
            self.emit(&mut state.drafts, draft);
        }
        state
    }

    fn emit(&self, drafts: &mut Vec<SpanDraft>, draft: SpanDraft) {
        if draft.text.chars().count() >= self.min_chars {
            drafts.push(draft);
            return;
        }

        let Some(prev) = drafts.last_mut().filter(|d| !d.oversized) else {
            tracing::debug!(text = %draft.text, "dropping micro-chunk with no previous chunk on page");
            return;
        };
        let merged = format!("{} {}", prev.text, draft.text);
        let tokens = self.counter.count(&merged);
        if tokens > self.merge_cap() {
            tracing::debug!(
                text = %draft.text,
                tokens,
                cap = self.merge_cap(),
                "dropping micro-chunk; merge would exceed cap"
            );
            return;
        }
        prev.text = merged;
        prev.tokens = tokens;
        prev.bbox = match (prev.bbox, draft.bbox) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
    }
}
