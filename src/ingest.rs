//! Ingestion pipeline: pages → chunks → vector index.
//!
//! ```text
//! PageSource::load_pages ─▶ ExtractOptions::select ─▶ DocumentSplitter
//!        (blocking)                                     (blocking)
//!                    ─▶ validate ids ─▶ filter + dedupe ─▶ VectorIndex::rebuild
//! ```
//!
//! Recoverable failures (unreadable document, nothing to index, index
//! errors) come back as an [`IngestReport`] with `status = failed` and a
//! [`ReasonCode`]. A chunk without an id is a splitter bug and aborts the
//! run with [`IngestError::MissingChunkId`].

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use pagewise_core::store::VectorIndex;
use pagewise_core::{Chunk, DocumentSplitter, Page};

use crate::extract::{DocumentSource, ExtractOptions, PageSource};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("splitter returned a chunk without chunk_id (document {document_id}, chunk {index})")]
    MissingChunkId { document_id: String, index: usize },

    #[error("ingestion task failed: {0}")]
    Task(String),
}

/// How pages are handed to the splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Each page split on its own; chunks keep their page number.
    #[default]
    Pages,
    /// All pages joined and split as one text.
    Combined,
    /// Span geometry where present, text otherwise.
    Spans,
}

impl IngestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestMode::Pages => "pages",
            IngestMode::Combined => "combined",
            IngestMode::Spans => "spans",
        }
    }
}

impl FromStr for IngestMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "pages" => Ok(IngestMode::Pages),
            "combined" => Ok(IngestMode::Combined),
            "spans" => Ok(IngestMode::Spans),
            other => anyhow::bail!("Unknown ingest mode: '{}'. Must be pages, combined, or spans.", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    PageProviderFailed,
    NoPages,
    NoUsableChunks,
    IndexFailed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub document_id: String,
    pub filename: Option<String>,
    pub status: IngestStatus,
    pub reason: Option<ReasonCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub pages: usize,
    pub ocr_pages: usize,
    pub chunks: usize,
    pub duplicates_removed: usize,
    pub chunks_by_type: BTreeMap<String, usize>,
    pub ingested_at: String,
}

impl IngestReport {
    fn new(document_id: &str, filename: Option<String>) -> Self {
        Self {
            document_id: document_id.to_string(),
            filename,
            status: IngestStatus::Ok,
            reason: None,
            message: None,
            pages: 0,
            ocr_pages: 0,
            chunks: 0,
            duplicates_removed: 0,
            chunks_by_type: BTreeMap::new(),
            ingested_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn fail(mut self, reason: ReasonCode, message: impl Into<String>) -> Self {
        self.status = IngestStatus::Failed;
        self.reason = Some(reason);
        self.message = Some(message.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == IngestStatus::Ok
    }
}

/// One document to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source: DocumentSource,
    pub document_id: String,
    pub filename: Option<String>,
}

/// Run the splitter over `pages` according to `mode`.
pub fn split_with_mode(
    splitter: &dyn DocumentSplitter,
    pages: &[Page],
    document_id: &str,
    mode: IngestMode,
) -> Vec<Chunk> {
    match mode {
        IngestMode::Pages => splitter.split_pages(pages, document_id),
        IngestMode::Combined => splitter.split_pages_combined(pages, document_id),
        IngestMode::Spans => splitter.split_pages_with_spans(pages, document_id),
    }
}

/// Every chunk must carry an id.
pub fn check_chunk_ids(chunks: &[Chunk], document_id: &str) -> Result<(), IngestError> {
    match chunks.iter().position(|c| c.chunk_id.trim().is_empty()) {
        Some(index) => Err(IngestError::MissingChunkId {
            document_id: document_id.to_string(),
            index,
        }),
        None => Ok(()),
    }
}

/// Drop blank and undersized chunks, then exact duplicates (same id and
/// same content, first wins). Ids only hash a content prefix, so two chunks
/// sharing an id but not their text are both kept. Returns the kept chunks
/// and the number of duplicates removed.
pub fn filter_chunks(chunks: Vec<Chunk>, min_chunk_tokens: usize) -> (Vec<Chunk>, usize) {
    let mut seen = HashSet::new();
    let mut duplicates = 0;
    let kept = chunks
        .into_iter()
        .filter(|c| !c.content.trim().is_empty() && c.token_count >= min_chunk_tokens)
        .filter(|c| {
            let fresh = seen.insert((c.chunk_id.clone(), c.content.clone()));
            if !fresh {
                duplicates += 1;
            }
            fresh
        })
        .collect();
    (kept, duplicates)
}

pub struct IngestPipeline {
    pages: Arc<dyn PageSource>,
    splitter: Arc<dyn DocumentSplitter>,
    index: Arc<dyn VectorIndex>,
    mode: IngestMode,
    min_chunk_tokens: usize,
    options: ExtractOptions,
}

impl IngestPipeline {
    pub fn new(
        pages: Arc<dyn PageSource>,
        splitter: Arc<dyn DocumentSplitter>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            pages,
            splitter,
            index,
            mode: IngestMode::default(),
            min_chunk_tokens: 3,
            options: ExtractOptions::default(),
        }
    }

    pub fn with_mode(mut self, mode: IngestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_min_chunk_tokens(mut self, min_chunk_tokens: usize) -> Self {
        self.min_chunk_tokens = min_chunk_tokens;
        self
    }

    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport, IngestError> {
        let IngestRequest {
            source,
            document_id,
            filename,
        } = request;
        let mut report = IngestReport::new(&document_id, filename);

        let pages = self.pages.clone();
        let splitter = self.splitter.clone();
        let options = self.options.clone();
        let mode = self.mode;
        let doc = document_id.clone();

        // Extraction and splitting are CPU-bound and may call a blocking embedder.
        let loaded = tokio::task::spawn_blocking(move || {
            let pages = options.select(pages.load_pages(&source, &doc)?);
            let chunks = split_with_mode(splitter.as_ref(), &pages, &doc, mode);
            Ok::<_, crate::extract::ExtractError>((pages, chunks))
        })
        .await
        .map_err(|e| IngestError::Task(e.to_string()))?;

        let (pages, chunks) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(document_id, error = %e, "page extraction failed");
                return Ok(report.fail(ReasonCode::PageProviderFailed, e.to_string()));
            }
        };

        report.pages = pages.len();
        report.ocr_pages = pages.iter().filter(|p| p.ocr_used).count();
        if pages.is_empty() {
            return Ok(report.fail(ReasonCode::NoPages, "document has no usable pages"));
        }

        check_chunk_ids(&chunks, &document_id)?;
        let (chunks, duplicates) = filter_chunks(chunks, self.min_chunk_tokens);
        report.duplicates_removed = duplicates;
        if chunks.is_empty() {
            return Ok(report.fail(ReasonCode::NoUsableChunks, "no chunks above the minimum size"));
        }

        report.chunks = chunks.len();
        for chunk in &chunks {
            *report
                .chunks_by_type
                .entry(chunk.chunk_type.as_str().to_string())
                .or_default() += 1;
        }

        if let Err(e) = self.index.rebuild(&document_id, &chunks).await {
            tracing::warn!(document_id, error = %e, "index rebuild failed");
            return Ok(report.fail(ReasonCode::IndexFailed, format!("{:#}", e)));
        }

        tracing::info!(
            document_id,
            pages = report.pages,
            chunks = report.chunks,
            duplicates,
            mode = self.mode.as_str(),
            "ingested document"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;
    use async_trait::async_trait;
    use pagewise_core::store::ScoredChunk;
    use pagewise_core::{ChunkType, SplitConfig, TextSplitter, TokenCounter};
    use std::sync::Mutex;

    struct StaticPages(Vec<Page>);

    impl PageSource for StaticPages {
        fn load_pages(&self, _: &DocumentSource, _: &str) -> Result<Vec<Page>, ExtractError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenPages;

    impl PageSource for BrokenPages {
        fn load_pages(&self, _: &DocumentSource, _: &str) -> Result<Vec<Page>, ExtractError> {
            Err(ExtractError::Pdf("bad xref".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        rebuilt: Mutex<Vec<(String, usize)>>,
        fail: bool,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn rebuild(&self, document_id: &str, chunks: &[Chunk]) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("store offline");
            }
            self.rebuilt
                .lock()
                .unwrap()
                .push((document_id.to_string(), chunks.len()));
            Ok(())
        }

        async fn query(&self, _: &str, _: &str, _: usize) -> anyhow::Result<Vec<ScoredChunk>> {
            Ok(Vec::new())
        }
    }

    /// Splitter that forgets to assign ids.
    struct IdlessSplitter;

    impl DocumentSplitter for IdlessSplitter {
        fn split_text(&self, text: &str, document_id: &str, page_number: Option<u32>) -> Vec<Chunk> {
            vec![Chunk {
                content: text.to_string(),
                document_id: document_id.to_string(),
                page_number,
                heading: None,
                chunk_type: ChunkType::Generic,
                token_count: 10,
                chunk_id: String::new(),
                bbox: None,
            }]
        }
    }

    fn splitter() -> Arc<dyn DocumentSplitter> {
        Arc::new(
            TextSplitter::builder()
                .config(SplitConfig::default())
                .token_counter(TokenCounter::estimate())
                .build()
                .unwrap(),
        )
    }

    fn request(doc: &str) -> IngestRequest {
        IngestRequest {
            source: DocumentSource::new(format!("{}.pdf", doc)),
            document_id: doc.to_string(),
            filename: Some(format!("{}.pdf", doc)),
        }
    }

    fn lease_pages() -> Vec<Page> {
        vec![
            Page::new(1, "The tenant pays rent of $1,200 on the first day of each month."),
            Page::new(2, ""),
            Page::new(3, "Pets are not permitted without written consent from the landlord."),
        ]
    }

    #[tokio::test]
    async fn test_ingest_success_report() {
        let index = Arc::new(RecordingIndex::default());
        let pipeline = IngestPipeline::new(Arc::new(StaticPages(lease_pages())), splitter(), index.clone());

        let report = pipeline.ingest(request("lease")).await.unwrap();
        assert!(report.is_ok());
        assert_eq!(report.pages, 2);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.filename.as_deref(), Some("lease.pdf"));
        assert_eq!(report.chunks_by_type.get("generic"), Some(&2));
        assert_eq!(*index.rebuilt.lock().unwrap(), vec![("lease".to_string(), 2)]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["reason"].is_null());
        assert!(json["ingestedAt"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn test_provider_failure_is_reported() {
        let index = Arc::new(RecordingIndex::default());
        let pipeline = IngestPipeline::new(Arc::new(BrokenPages), splitter(), index.clone());
        let report = pipeline.ingest(request("bad")).await.unwrap();
        assert_eq!(report.status, IngestStatus::Failed);
        assert_eq!(report.reason, Some(ReasonCode::PageProviderFailed));
        assert!(index.rebuilt.lock().unwrap().is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["reason"], "page_provider_failed");
    }

    #[tokio::test]
    async fn test_no_pages_and_no_chunks() {
        let index: Arc<dyn VectorIndex> = Arc::new(RecordingIndex::default());

        let empty = IngestPipeline::new(Arc::new(StaticPages(vec![Page::new(1, "  ")])), splitter(), index.clone());
        let report = empty.ingest(request("blank")).await.unwrap();
        assert_eq!(report.reason, Some(ReasonCode::NoPages));

        let tiny = IngestPipeline::new(Arc::new(StaticPages(vec![Page::new(1, "ok")])), splitter(), index)
            .with_min_chunk_tokens(50);
        let report = tiny.ingest(request("tiny")).await.unwrap();
        assert_eq!(report.reason, Some(ReasonCode::NoUsableChunks));
    }

    #[tokio::test]
    async fn test_index_failure_is_reported() {
        let index = Arc::new(RecordingIndex {
            fail: true,
            ..Default::default()
        });
        let pipeline = IngestPipeline::new(Arc::new(StaticPages(lease_pages())), splitter(), index);
        let report = pipeline.ingest(request("lease")).await.unwrap();
        assert_eq!(report.reason, Some(ReasonCode::IndexFailed));
        assert!(report.message.unwrap().contains("store offline"));
    }

    #[tokio::test]
    async fn test_missing_chunk_id_is_fatal() {
        let pipeline = IngestPipeline::new(
            Arc::new(StaticPages(lease_pages())),
            Arc::new(IdlessSplitter),
            Arc::new(RecordingIndex::default()),
        );
        let err = pipeline.ingest(request("lease")).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingChunkId { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_combined_mode_drops_page_numbers() {
        let index = Arc::new(RecordingIndex::default());
        let pipeline = IngestPipeline::new(Arc::new(StaticPages(lease_pages())), splitter(), index.clone())
            .with_mode(IngestMode::Combined);
        let report = pipeline.ingest(request("lease")).await.unwrap();
        assert!(report.is_ok());
        assert_eq!(report.chunks, 1);
    }

    #[test]
    fn test_filter_chunks_dedupes_and_drops_small() {
        let counter = TokenCounter::estimate();
        let make = |text: &str| {
            Chunk::wrap(&counter, text, "d", Some(1), None, ChunkType::Generic, None).unwrap()
        };
        let long = "A sentence that is comfortably above the minimum size.";
        let chunks = vec![make(long), make("tiny"), make(long)];
        let (kept, duplicates) = filter_chunks(chunks, 3);
        assert_eq!(kept.len(), 1);
        assert_eq!(duplicates, 1);
    }

    #[test]
    fn test_filter_chunks_keeps_shared_prefix_chunks() {
        let counter = TokenCounter::estimate();
        let clause = "The tenant shall keep the premises in good repair and shall \
                      notify the landlord without delay of any damage to the building ";
        assert!(clause.chars().count() > 120);
        let make = |tail: &str| {
            let text = format!("{}{}", clause, tail);
            Chunk::wrap(&counter, &text, "d", Some(1), None, ChunkType::Recursive, None).unwrap()
        };
        let fire = make("caused by fire.");
        let water = make("caused by water, and pay rent of 9.800,96€ monthly.");
        assert_eq!(fire.chunk_id, water.chunk_id);

        let (kept, duplicates) = filter_chunks(vec![fire, water], 3);
        assert_eq!(kept.len(), 2);
        assert_eq!(duplicates, 0);
        assert!(kept[1].content.contains("9.800,96€"));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("spans".parse::<IngestMode>().unwrap(), IngestMode::Spans);
        assert!("chapters".parse::<IngestMode>().is_err());
    }
}
