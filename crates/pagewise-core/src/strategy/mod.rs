//! Segmentation strategies used by the [`TextSplitter`](crate::splitter::TextSplitter).
//!
//! | Strategy | Input | Needs |
//! |----------|-------|-------|
//! | [`recursive`] | text | token counter |
//! | [`semantic`] | text | token counter + [`Embedder`](crate::embedding::Embedder) |
//! | [`spans`] | one page of spans | token counter |
//!
//! Every strategy terminates and returns at least one part for non-blank
//! input. A unit that cannot be subdivided further is returned whole even
//! when it exceeds the budget.

pub mod recursive;
pub mod semantic;
pub mod spans;

pub use recursive::RecursiveSplitter;
pub use semantic::{BreakpointThreshold, SemanticError, SemanticSplitter};
pub use spans::{SpanDraft, SpanFold};
