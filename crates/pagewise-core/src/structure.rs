//! Structure markers inside cleaned text.
//!
//! Two independent detectors:
//!
//! - [`split_by_headings`]: markdown-style headings (`#` … `######`) split
//!   text into ordered [`Section`]s. Text before the first heading belongs to
//!   an implicit `"Introduction"` section.
//! - [`split_legal_sections`]: splits before every `§` marker that is
//!   followed by a word, keeping the marker at the start of its section.
//!
//! Both are pure text transforms and never fail.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})\s*([^\s#].*?)\s*$").unwrap());
static LEGAL_MARK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"§\s*\w").unwrap());
static LEGAL_HEAD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"§\s*(\w+)").unwrap());

/// Heading assigned to text that precedes the first heading.
pub const INTRODUCTION: &str = "Introduction";

pub const SECTION_MARK: char = '§';

/// A heading and the lines that follow it, up to the next heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    /// Number of `#` characters; `0` for the implicit introduction.
    pub level: usize,
    pub lines: Vec<String>,
}

impl Section {
    /// Body text: the content lines joined and trimmed.
    pub fn body(&self) -> String {
        self.lines.join("\n").trim().to_string()
    }
}

/// A detected heading line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub text: String,
    pub level: usize,
}

/// Parse a single line as a heading.
pub fn parse_heading(line: &str) -> Option<Heading> {
    let caps = HEADING_RE.captures(line)?;
    Some(Heading {
        text: caps[2].to_string(),
        level: caps[1].len(),
    })
}

/// All headings in `text`, in order.
pub fn detect_headings(text: &str) -> Vec<Heading> {
    text.lines().filter_map(parse_heading).collect()
}

/// Split `text` into heading sections. Sections without content lines are
/// dropped, so a result of length ≤ 1 means "no usable structure".
pub fn split_by_headings(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        heading: INTRODUCTION.to_string(),
        level: 0,
        lines: Vec::new(),
    };

    for line in text.split('\n') {
        match parse_heading(line) {
            Some(h) => {
                let next = Section {
                    heading: h.text,
                    level: h.level,
                    lines: Vec::new(),
                };
                let done = std::mem::replace(&mut current, next);
                if !done.lines.is_empty() {
                    sections.push(done);
                }
            }
            None => current.lines.push(line.to_string()),
        }
    }
    if !current.lines.is_empty() {
        sections.push(current);
    }
    sections
}

/// A `§`-delimited section of legal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalSection {
    /// `"§" + label`, or a bare `"§"` when no label follows the marker.
    pub heading: String,
    pub text: String,
}

/// Split before every `§` marker followed by a word.
pub fn split_legal_sections(text: &str) -> Vec<LegalSection> {
    let mut cuts: Vec<usize> = LEGAL_MARK_RE.find_iter(text).map(|m| m.start()).collect();
    if cuts.first() != Some(&0) {
        cuts.insert(0, 0);
    }
    cuts.push(text.len());

    cuts.windows(2)
        .map(|w| text[w[0]..w[1]].trim())
        .filter(|piece| !piece.is_empty())
        .map(|piece| LegalSection {
            heading: legal_heading(piece),
            text: piece.to_string(),
        })
        .collect()
}

fn legal_heading(section: &str) -> String {
    match LEGAL_HEAD_RE.captures(section) {
        Some(caps) => format!("{}{}", SECTION_MARK, &caps[1]),
        None => SECTION_MARK.to_string(),
    }
}
