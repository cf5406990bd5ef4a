//! Page extraction.
//!
//! A [`PageSource`] turns a document on disk into ordered [`Page`]s. The
//! built-in sources:
//!
//! | Source | Input |
//! |--------|-------|
//! | [`PdfPageSource`] | `.pdf`, text layer via `pdf-extract`, one page per PDF page |
//! | [`TextPageSource`] | `.txt` / `.text` / `.md`, form feeds separate pages |
//! | [`JsonPageSource`] | `.json`, `[{pageNumber, content, spans?, ocrUsed?}]` |
//! | [`ExtractingPageSource`] | dispatches to the above by file extension |
//!
//! [`page_report`] summarizes extracted pages for the viewer endpoint.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use pagewise_core::clean::clean;
use pagewise_core::identity::short_hash;
use pagewise_core::structure::{detect_headings, Heading};
use pagewise_core::Page;

use crate::config::ExtractConfig;

const PAGE_BREAK: char = '\x0C';

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("invalid page JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pages: {0}")]
    InvalidPages(String),
}

/// A document to extract pages from.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub path: PathBuf,
}

impl DocumentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Lower-cased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// File stem, used as the default document id.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string()
    }

    fn read_bytes(&self) -> Result<Vec<u8>, ExtractError> {
        std::fs::read(&self.path).map_err(|source| ExtractError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn read_string(&self) -> Result<String, ExtractError> {
        std::fs::read_to_string(&self.path).map_err(|source| ExtractError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

/// Produces the pages of a document, numbered from 1 in reading order.
pub trait PageSource: Send + Sync {
    fn load_pages(&self, source: &DocumentSource, document_id: &str) -> Result<Vec<Page>, ExtractError>;
}

/// Split text on form feeds into numbered pages. A trailing empty segment
/// after the final form feed is not a page.
fn pages_from_text(text: &str) -> Vec<Page> {
    let mut segments: Vec<&str> = text.split(PAGE_BREAK).collect();
    if segments.len() > 1 && segments.last().is_some_and(|s| s.trim().is_empty()) {
        segments.pop();
    }
    segments
        .into_iter()
        .enumerate()
        .map(|(i, content)| Page::new(i as u32 + 1, content))
        .collect()
}

/// Page numbers must be positive and unique.
pub fn validate_pages(pages: &[Page]) -> Result<(), ExtractError> {
    let mut seen = HashSet::new();
    for page in pages {
        if page.page_number == 0 {
            return Err(ExtractError::InvalidPages("page numbers start at 1".to_string()));
        }
        if !seen.insert(page.page_number) {
            return Err(ExtractError::InvalidPages(format!(
                "duplicate page number {}",
                page.page_number
            )));
        }
    }
    Ok(())
}

/// PDF text layer. Scanned pages come back empty: there is no OCR.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfPageSource;

impl PdfPageSource {
    pub fn extract(bytes: &[u8]) -> Result<Vec<Page>, ExtractError> {
        // pdf-extract panics on some malformed inputs
        let texts = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
            .map_err(|_| ExtractError::Pdf("parser panicked on malformed input".to_string()))?
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        Ok(texts
            .into_iter()
            .zip(1u32..)
            .map(|(text, number)| Page::new(number, text))
            .collect())
    }
}

impl PageSource for PdfPageSource {
    fn load_pages(&self, source: &DocumentSource, document_id: &str) -> Result<Vec<Page>, ExtractError> {
        let bytes = source.read_bytes()?;
        let pages = Self::extract(&bytes)?;
        tracing::debug!(document_id, pages = pages.len(), "extracted PDF text");
        Ok(pages)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextPageSource;

impl PageSource for TextPageSource {
    fn load_pages(&self, source: &DocumentSource, _document_id: &str) -> Result<Vec<Page>, ExtractError> {
        Ok(pages_from_text(&source.read_string()?))
    }
}

/// Pre-extracted pages, the only input that carries span geometry.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPageSource;

impl JsonPageSource {
    pub fn parse(json: &str) -> Result<Vec<Page>, ExtractError> {
        let mut pages: Vec<Page> = serde_json::from_str(json)?;
        validate_pages(&pages)?;
        pages.sort_by_key(|p| p.page_number);
        Ok(pages)
    }
}

impl PageSource for JsonPageSource {
    fn load_pages(&self, source: &DocumentSource, _document_id: &str) -> Result<Vec<Page>, ExtractError> {
        Self::parse(&source.read_string()?)
    }
}

/// Picks a source by file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractingPageSource;

impl PageSource for ExtractingPageSource {
    fn load_pages(&self, source: &DocumentSource, document_id: &str) -> Result<Vec<Page>, ExtractError> {
        match source.extension().as_deref() {
            Some("pdf") => PdfPageSource.load_pages(source, document_id),
            Some("txt") | Some("text") | Some("md") => TextPageSource.load_pages(source, document_id),
            Some("json") => JsonPageSource.load_pages(source, document_id),
            Some(other) => Err(ExtractError::UnsupportedType(other.to_string())),
            None => Err(ExtractError::UnsupportedType(
                source.path.display().to_string(),
            )),
        }
    }
}

/// Page selection applied after extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub max_pages: Option<usize>,
    pub skip_empty_pages: bool,
    /// Run the boilerplate cleaner over reported page text.
    pub trim_whitespace: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from(&ExtractConfig::default())
    }
}

impl From<&ExtractConfig> for ExtractOptions {
    fn from(config: &ExtractConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            skip_empty_pages: config.skip_empty_pages,
            trim_whitespace: config.trim_whitespace,
        }
    }
}

impl ExtractOptions {
    /// Evaluate at most `max_pages` pages, dropping empty ones if enabled.
    pub fn select(&self, pages: Vec<Page>) -> Vec<Page> {
        let limit = self.max_pages.unwrap_or(usize::MAX);
        pages
            .into_iter()
            .take(limit)
            .filter(|p| !self.skip_empty_pages || !p.content.trim().is_empty() || p.has_spans())
            .collect()
    }
}

/// Per-page summary for the viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub page_number: u32,
    pub page_id: String,
    /// `text` or `ocr`.
    pub text_source: &'static str,
    pub headings: Vec<Heading>,
    pub word_count: usize,
    pub char_count: usize,
    pub page_indicator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub document_id: String,
    pub total_pages: usize,
    pub pages_returned: usize,
    pub max_pages_evaluated: Option<usize>,
    pub ocr_used: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReport {
    pub metadata: ReportMetadata,
    pub pages: Vec<PageSummary>,
}

/// Summarize `pages` (as extracted, before selection) for `document_id`.
///
/// Emptiness is judged after cleaning when `trim_whitespace` is set.
pub fn page_report(
    document_id: &str,
    pages: Vec<Page>,
    options: &ExtractOptions,
    include_content: bool,
) -> PageReport {
    let total_pages = pages.len();
    let limit = options.max_pages.unwrap_or(usize::MAX);

    let summaries: Vec<PageSummary> = pages
        .into_iter()
        .take(limit)
        .filter_map(|page| {
            let text = if options.trim_whitespace {
                clean(&page.content)
            } else {
                page.content
            };
            if options.skip_empty_pages && text.trim().is_empty() {
                return None;
            }
            Some(PageSummary {
                page_number: page.page_number,
                page_id: short_hash(&format!("{}:{}", document_id, page.page_number)),
                text_source: if page.ocr_used { "ocr" } else { "text" },
                headings: detect_headings(&text),
                word_count: text.split_whitespace().count(),
                char_count: text.chars().count(),
                page_indicator: format!("Page {}/{}", page.page_number, total_pages),
                content: include_content.then_some(text),
            })
        })
        .collect();
    let ocr_used = summaries.iter().any(|p| p.text_source == "ocr");

    PageReport {
        metadata: ReportMetadata {
            document_id: document_id.to_string(),
            total_pages,
            pages_returned: summaries.len(),
            max_pages_evaluated: options.max_pages,
            ocr_used,
        },
        pages: summaries,
    }
}

/// Document id for `path` when the caller did not supply one.
pub fn default_document_id(path: &Path) -> String {
    DocumentSource::new(path).stem()
}
