//! Recursive separator splitting with a token budget and overlap.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `["\n\n", "\n", ". ", " ", ""]` that
//!    occurs in the text.
//! 2. Split on it, keeping the separator at the end of the preceding piece.
//! 3. Merge consecutive pieces greedily while their token sum stays within
//!    `chunk_tokens`. After each emitted chunk, trailing pieces totalling at
//!    most `overlap_tokens` are carried into the next one.
//! 4. A piece that is still over budget is split again with the remaining,
//!    finer separators.
//! 5. The empty separator means "characters": the text is cut into the
//!    longest prefixes that fit the budget.
//!
//! Every level strictly shrinks its input, so the recursion terminates.

use std::collections::VecDeque;

use crate::tokens::TokenCounter;

/// Separators, coarsest first. The trailing `""` is the character level.
pub const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_tokens: usize,
    overlap_tokens: usize,
    counter: TokenCounter,
}

impl RecursiveSplitter {
    /// `chunk_tokens` is clamped to at least 1 and `overlap_tokens` to
    /// strictly less than `chunk_tokens`.
    pub fn new(chunk_tokens: usize, overlap_tokens: usize, counter: TokenCounter) -> Self {
        let chunk_tokens = chunk_tokens.max(1);
        Self {
            chunk_tokens,
            overlap_tokens: overlap_tokens.min(chunk_tokens - 1),
            counter,
        }
    }

    /// Split `text` into trimmed, non-empty parts. Blank input yields no parts.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.split_into(text, &SEPARATORS, &mut out);
        if out.is_empty() {
            out.push(text.trim().to_string());
        }
        out
    }

    fn split_into(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        let Some(pos) = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
        else {
            self.split_chars(text, out);
            return;
        };
        let separator = separators[pos];
        if separator.is_empty() {
            self.split_chars(text, out);
            return;
        }
        let finer = &separators[pos + 1..];

        let mut fitting: Vec<(&str, usize)> = Vec::new();
        for piece in text.split_inclusive(separator) {
            if piece.trim().is_empty() {
                continue;
            }
            let tokens = self.counter.count(piece);
            if tokens <= self.chunk_tokens {
                fitting.push((piece, tokens));
                continue;
            }
            if !fitting.is_empty() {
                self.merge(&fitting, out);
                fitting.clear();
            }
            self.split_into(piece, finer, out);
        }
        if !fitting.is_empty() {
            self.merge(&fitting, out);
        }
    }

    fn merge(&self, pieces: &[(&str, usize)], out: &mut Vec<String>) {
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &(piece, tokens) in pieces {
            if total + tokens > self.chunk_tokens && !window.is_empty() {
                push_joined(&window, out);
                while total > self.overlap_tokens || (total > 0 && total + tokens > self.chunk_tokens) {
                    match window.pop_front() {
                        Some((_, n)) => total -= n,
                        None => break,
                    }
                }
            }
            window.push_back((piece, tokens));
            total += tokens;
        }
        if !window.is_empty() {
            push_joined(&window, out);
        }
    }

    /// Character level: cut the longest prefix that fits, at least one char.
    fn split_chars(&self, text: &str, out: &mut Vec<String>) {
        let mut rest = text;
        while !rest.trim().is_empty() {
            // ends[k] is the byte end of the (k + 1)-char prefix
            let ends: Vec<usize> = rest
                .char_indices()
                .skip(1)
                .map(|(i, _)| i)
                .chain(std::iter::once(rest.len()))
                .collect();

            let (mut lo, mut hi) = (0usize, ends.len() - 1);
            while lo < hi {
                let mid = (lo + hi).div_ceil(2);
                if self.counter.count(&rest[..ends[mid]]) <= self.chunk_tokens {
                    lo = mid;
                } else {
                    hi = mid - 1;
                }
            }

            let end = ends[lo];
            let piece = rest[..end].trim();
            if !piece.is_empty() {
                out.push(piece.to_string());
            }
            rest = &rest[end..];
        }
    }
}

fn push_joined(window: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let joined = joined.trim();
    if !joined.is_empty() {
        out.push(joined.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(chunk, overlap, TokenCounter::estimate())
    }

    fn collapse(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_small_text_single_part() {
        let parts = splitter(50, 5).split("Hello, world!");
        assert_eq!(parts, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_blank_text_no_parts() {
        assert!(splitter(50, 5).split("   \n\n ").is_empty());
    }

    #[test]
    fn test_parts_respect_budget() {
        let text = (0..12)
            .map(|i| format!("Paragraph number {i} has some words."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let s = splitter(20, 0);
        let parts = s.split(&text);
        assert!(parts.len() > 1);
        let counter = TokenCounter::estimate();
        for p in &parts {
            assert!(counter.count(p) <= 20, "over budget: {p:?}");
        }
    }

    #[test]
    fn test_no_overlap_reconstructs_text() {
        let text = "First sentence is here. Second sentence follows it. \
                    Third one arrives now. Fourth and final sentence.";
        let parts = splitter(8, 0).split(text);
        assert!(parts.len() > 1);
        assert_eq!(collapse(&parts.join(" ")), collapse(text));
    }

    #[test]
    fn test_overlap_repeats_trailing_piece() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let parts = splitter(6, 2).split(text);
        assert!(parts.len() > 2);
        for pair in parts.windows(2) {
            let last = pair[0].split_whitespace().last().unwrap();
            let first = pair[1].split_whitespace().next().unwrap();
            assert_eq!(last, first, "no overlap between {:?} and {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_unbreakable_word_is_cut_by_chars() {
        let word = "x".repeat(100);
        let parts = splitter(5, 0).split(&word);
        assert_eq!(parts.len(), 5);
        assert!(parts.iter().all(|p| p.len() == 20));
        assert_eq!(parts.concat(), word);
    }

    #[test]
    fn test_multibyte_text_terminates() {
        let text = "§ü".repeat(150);
        let parts = splitter(3, 1).split(&text);
        assert!(!parts.is_empty());
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn test_overlap_clamped_below_chunk() {
        let s = RecursiveSplitter::new(4, 10, TokenCounter::estimate());
        let parts = s.split("one two three four five six seven eight nine ten");
        assert!(parts.len() > 1);
    }
}
