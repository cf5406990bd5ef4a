//! Boilerplate removal and whitespace normalization.
//!
//! [`clean`] runs five steps in a fixed order; later steps assume the
//! normalization done by earlier ones:
//!
//! 1. Merge a `label:` line with a following line of 3+ digits
//!    (`"Invoice No:\n12345"` → `"Invoice No: 12345"`), so numeric ids are not
//!    mistaken for page numbers in step 2.
//! 2. Drop lines that are only a boilerplate keyword (`Confidential`,
//!    `Draft`, any case) or only digits.
//! 3. Collapse runs of spaces and tabs to one space.
//! 4. Collapse 3+ consecutive newlines to 2.
//! 5. Trim trailing whitespace per line and drop empty lines.
//!
//! The transform is idempotent: `clean(clean(x)) == clean(x)`.

use regex::Regex;
use std::sync::LazyLock;

static LABEL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([^\n]*:)[ \t\r]*\n[ \t]*(\d{3,})[ \t\r]*$").unwrap());
static BOILERPLATE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:confidential|draft)\s*$").unwrap());
static DIGITS_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+\s*$").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Normalize `text` and strip recurring non-content lines.
pub fn clean(text: &str) -> String {
    let merged = LABEL_ID_RE.replace_all(text, "$1 $2");

    let kept: Vec<&str> = merged
        .split('\n')
        .filter(|line| !is_boilerplate_line(line))
        .collect();
    let text = kept.join("\n");

    let text = SPACE_RE.replace_all(&text, " ");
    let text = BLANKS_RE.replace_all(&text, "\n\n");

    text.split('\n')
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_boilerplate_line(line: &str) -> bool {
    BOILERPLATE_LINE_RE.is_match(line) || DIGITS_LINE_RE.is_match(line)
}
