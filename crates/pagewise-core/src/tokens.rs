//! Token accounting for chunk budgets.
//!
//! [`TokenCounter`] measures text in a model-agnostic "token" unit. The
//! primary backend is the `cl100k_base` BPE (behind the `tiktoken` feature),
//! which matches the accounting of the OpenAI embedding models. When the BPE
//! is unavailable the counter degrades to a character-ratio estimate instead
//! of failing ingestion.
//!
//! A counter is chosen once per splitter and cloned into every strategy, so
//! a single run never mixes estimators.

use std::fmt;
use std::sync::Arc;

/// Approximate characters-per-token ratio for the fallback estimator.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Clone)]
enum Backend {
    #[cfg(feature = "tiktoken")]
    Bpe(Arc<tiktoken_rs::CoreBPE>),
    Estimate,
}

/// Counts tokens; every count is at least 1.
#[derive(Clone)]
pub struct TokenCounter {
    backend: Backend,
}

impl TokenCounter {
    /// The `cl100k_base` tokenizer, or the estimator if it cannot be loaded.
    pub fn cl100k() -> Self {
        #[cfg(feature = "tiktoken")]
        {
            match tiktoken_rs::cl100k_base() {
                Ok(bpe) => {
                    return Self {
                        backend: Backend::Bpe(Arc::new(bpe)),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cl100k_base unavailable; using chars/4 token estimate");
                }
            }
        }
        #[cfg(not(feature = "tiktoken"))]
        tracing::debug!("built without the tiktoken feature; using chars/4 token estimate");

        Self::estimate()
    }

    /// The `max(1, ceil(chars / 4))` estimator.
    pub fn estimate() -> Self {
        Self {
            backend: Backend::Estimate,
        }
    }

    /// Resolve a counter from its configuration name (`"cl100k"` or `"estimate"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cl100k" | "cl100k_base" => Some(Self::cl100k()),
            "estimate" => Some(Self::estimate()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.backend {
            #[cfg(feature = "tiktoken")]
            Backend::Bpe(_) => "cl100k",
            Backend::Estimate => "estimate",
        }
    }

    pub fn count(&self, text: &str) -> usize {
        let n = match &self.backend {
            #[cfg(feature = "tiktoken")]
            Backend::Bpe(bpe) => bpe.encode_ordinary(text).len(),
            Backend::Estimate => estimate_tokens(text),
        };
        n.max(1)
    }
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter")
            .field("backend", &self.name())
            .finish()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::cl100k()
    }
}

fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}
