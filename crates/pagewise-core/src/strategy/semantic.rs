//! Embedding-distance topic segmentation.
//!
//! Text is cut into sentences; each sentence is embedded together with one
//! neighbour on either side to smooth out short sentences. A breakpoint is
//! placed after sentence `i` when the cosine distance between the windows of
//! `i` and `i + 1` exceeds a threshold derived from the whole distance
//! series (see [`BreakpointThreshold`]).

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;

use crate::embedding::{cosine_similarity, Embedder, EmbeddingError};

static SENTENCE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.?!]\s+").unwrap());

/// Sentences on either side included in each embedding window.
const WINDOW: usize = 1;

#[derive(Debug, Error)]
pub enum SemanticError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("embedder returned {actual} vectors for {expected} sentence windows")]
    VectorCount { expected: usize, actual: usize },

    #[error("non-finite distance after sentence {0}")]
    NonFinite(usize),
}

/// How the breakpoint threshold is derived from the distance series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakpointThreshold {
    /// Distances above the given percentile.
    Percentile(f32),
    /// Distances above `mean + amount * stddev`.
    StandardDeviation(f32),
    /// Distances above `mean + amount * IQR`.
    Interquartile(f32),
    /// Gradient of the distances above the given percentile of the gradient.
    Gradient(f32),
}

impl Default for BreakpointThreshold {
    fn default() -> Self {
        BreakpointThreshold::Percentile(95.0)
    }
}

impl BreakpointThreshold {
    /// Parse a configuration name, using the default amount for the kind
    /// when `amount` is `None`.
    pub fn from_name(name: &str, amount: Option<f32>) -> Option<Self> {
        let t = match name {
            "percentile" => BreakpointThreshold::Percentile(amount.unwrap_or(95.0)),
            "standard_deviation" => BreakpointThreshold::StandardDeviation(amount.unwrap_or(3.0)),
            "interquartile" => BreakpointThreshold::Interquartile(amount.unwrap_or(1.5)),
            "gradient" => BreakpointThreshold::Gradient(amount.unwrap_or(95.0)),
            _ => return None,
        };
        Some(t)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BreakpointThreshold::Percentile(_) => "percentile",
            BreakpointThreshold::StandardDeviation(_) => "standard_deviation",
            BreakpointThreshold::Interquartile(_) => "interquartile",
            BreakpointThreshold::Gradient(_) => "gradient",
        }
    }

    /// Indices `i` such that a new group starts after unit `i`.
    pub fn breakpoints(&self, distances: &[f32]) -> Vec<usize> {
        if distances.is_empty() {
            return Vec::new();
        }
        let (series, threshold) = match *self {
            BreakpointThreshold::Percentile(p) => (distances.to_vec(), percentile(distances, p)),
            BreakpointThreshold::StandardDeviation(k) => {
                let (mean, std) = mean_std(distances);
                (distances.to_vec(), mean + k * std)
            }
            BreakpointThreshold::Interquartile(k) => {
                let (mean, _) = mean_std(distances);
                let iqr = percentile(distances, 75.0) - percentile(distances, 25.0);
                (distances.to_vec(), mean + k * iqr)
            }
            BreakpointThreshold::Gradient(p) => {
                let g = gradient(distances);
                let threshold = percentile(&g, p);
                (g, threshold)
            }
        };
        series
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > threshold)
            .map(|(i, _)| i)
            .collect()
    }
}

impl fmt::Display for BreakpointThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = match self {
            BreakpointThreshold::Percentile(a)
            | BreakpointThreshold::StandardDeviation(a)
            | BreakpointThreshold::Interquartile(a)
            | BreakpointThreshold::Gradient(a) => a,
        };
        write!(f, "{}({})", self.name(), amount)
    }
}

/// Linear-interpolated percentile, `p` in `[0, 100]`.
fn percentile(values: &[f32], p: f32) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f32)
}

/// Mean and population standard deviation.
fn mean_std(values: &[f32]) -> (f32, f32) {
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, var.sqrt())
}

/// One-sided differences at the edges, central differences inside.
fn gradient(values: &[f32]) -> Vec<f32> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| match i {
            0 => values[1] - values[0],
            i if i == n - 1 => values[n - 1] - values[n - 2],
            i => (values[i + 1] - values[i - 1]) / 2.0,
        })
        .collect()
}

/// Split text into sentences ending in `.`, `?` or `!` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        // keep the (single-byte) punctuation, drop the whitespace
        push_trimmed(&mut sentences, &text[start..m.start() + 1]);
        start = m.end();
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

#[derive(Clone)]
pub struct SemanticSplitter {
    embedder: Arc<dyn Embedder>,
    threshold: BreakpointThreshold,
}

impl SemanticSplitter {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: BreakpointThreshold) -> Self {
        Self {
            embedder,
            threshold,
        }
    }

    /// Group sentences into topic-coherent parts. Blank input yields no parts;
    /// a single sentence is returned as-is without an embedding call.
    pub fn split(&self, text: &str) -> Result<Vec<String>, SemanticError> {
        let sentences = split_sentences(text);
        if sentences.len() < 2 {
            return Ok(sentences);
        }

        let windows: Vec<String> = (0..sentences.len())
            .map(|i| {
                let lo = i.saturating_sub(WINDOW);
                let hi = (i + WINDOW + 1).min(sentences.len());
                sentences[lo..hi].join(" ")
            })
            .collect();

        let vectors = self.embedder.embed_documents(&windows)?;
        if vectors.len() != windows.len() {
            return Err(SemanticError::VectorCount {
                expected: windows.len(),
                actual: vectors.len(),
            });
        }

        let mut distances = Vec::with_capacity(vectors.len() - 1);
        for (i, pair) in vectors.windows(2).enumerate() {
            let d = 1.0 - cosine_similarity(&pair[0], &pair[1]);
            if !d.is_finite() {
                return Err(SemanticError::NonFinite(i));
            }
            distances.push(d);
        }

        let breakpoints = self.threshold.breakpoints(&distances);
        tracing::debug!(
            sentences = sentences.len(),
            breakpoints = breakpoints.len(),
            threshold = %self.threshold,
            "semantic breakpoints"
        );

        let mut groups = Vec::with_capacity(breakpoints.len() + 1);
        let mut start = 0;
        for bp in breakpoints {
            groups.push(sentences[start..=bp].join(" "));
            start = bp + 1;
        }
        if start < sentences.len() {
            groups.push(sentences[start..].join(" "));
        }
        Ok(groups)
    }
}

impl fmt::Debug for SemanticSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticSplitter")
            .field("model", &self.embedder.model_name())
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two-topic embedder: counts "cat" and "engine" occurrences.
    struct TopicEmbedder;

    impl Embedder for TopicEmbedder {
        fn model_name(&self) -> &str {
            "topic"
        }

        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| vec![t.matches("cat").count() as f32, t.matches("engine").count() as f32])
                .collect())
        }
    }

    struct Failing;

    impl Embedder for Failing {
        fn model_name(&self) -> &str {
            "failing"
        }

        fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Request("connection refused".into()))
        }
    }

    struct Short;

    impl Embedder for Short {
        fn model_name(&self) -> &str {
            "short"
        }

        fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(vec![vec![1.0]])
        }
    }

    const TWO_TOPICS: &str = "The cat sleeps. The cat purrs. The cat eats. \
                              The engine roars. The engine idles. The engine stops.";

    #[test]
    fn test_sentences() {
        assert_eq!(
            split_sentences("One. Two?  Three!\nFour"),
            vec!["One.", "Two?", "Three!", "Four"]
        );
        assert_eq!(split_sentences("v1.2 stays whole."), vec!["v1.2 stays whole."]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_splits_on_topic_change() {
        let s = SemanticSplitter::new(Arc::new(TopicEmbedder), BreakpointThreshold::default());
        let groups = s.split(TWO_TOPICS).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], "The cat sleeps. The cat purrs. The cat eats.");
        assert_eq!(groups[1], "The engine roars. The engine idles. The engine stops.");
    }

    #[test]
    fn test_single_sentence_skips_embedder() {
        let s = SemanticSplitter::new(Arc::new(Failing), BreakpointThreshold::default());
        assert_eq!(s.split("Only one sentence.").unwrap(), vec!["Only one sentence."]);
    }

    #[test]
    fn test_embedder_failure_is_typed() {
        let s = SemanticSplitter::new(Arc::new(Failing), BreakpointThreshold::default());
        assert!(matches!(s.split(TWO_TOPICS), Err(SemanticError::Embedding(_))));
    }

    #[test]
    fn test_vector_count_mismatch() {
        let s = SemanticSplitter::new(Arc::new(Short), BreakpointThreshold::default());
        assert!(matches!(
            s.split(TWO_TOPICS),
            Err(SemanticError::VectorCount { expected: 6, actual: 1 })
        ));
    }

    #[test]
    fn test_percentile_interpolates() {
        assert_eq!(percentile(&[5.0, 1.0, 3.0, 2.0, 4.0], 50.0), 3.0);
        assert!((percentile(&[0.0, 10.0], 95.0) - 9.5).abs() < 1e-5);
    }

    #[test]
    fn test_standard_deviation_threshold() {
        let d = [0.0, 0.0, 0.0, 0.0, 10.0];
        assert!(BreakpointThreshold::StandardDeviation(3.0).breakpoints(&d).is_empty());
        assert_eq!(BreakpointThreshold::StandardDeviation(1.0).breakpoints(&d), vec![4]);
    }

    #[test]
    fn test_interquartile_threshold() {
        let d = [1.0, 2.0, 3.0, 4.0, 100.0];
        assert_eq!(BreakpointThreshold::Interquartile(1.5).breakpoints(&d), vec![4]);
    }

    #[test]
    fn test_gradient_threshold() {
        let d = [0.0, 0.0, 1.0, 0.0, 0.0];
        assert_eq!(BreakpointThreshold::Gradient(95.0).breakpoints(&d), vec![1]);
    }

    #[test]
    fn test_from_name_defaults() {
        assert_eq!(
            BreakpointThreshold::from_name("interquartile", None),
            Some(BreakpointThreshold::Interquartile(1.5))
        );
        assert_eq!(
            BreakpointThreshold::from_name("percentile", Some(90.0)),
            Some(BreakpointThreshold::Percentile(90.0))
        );
        assert!(BreakpointThreshold::from_name("kmeans", None).is_none());
    }
}
