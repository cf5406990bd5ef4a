//! Wiring from [`Config`] to the running components.
//!
//! Both the CLI and the HTTP server build their splitter, index, ingestion
//! pipeline, and answerer through [`Services::from_config`], so a given
//! config file behaves the same in either.

use anyhow::{Context, Result};
use std::sync::Arc;

use pagewise_core::embedding::{EmbedderCache, EmbeddingError};
use pagewise_core::store::VectorIndex;
use pagewise_core::{DocumentSplitter, TextSplitter};

use crate::answer::{create_answerer, Answerer, AskSettings};
use crate::config::Config;
use crate::embedding::{cache_key, create_embedder, resolve_embedder};
use crate::extract::{ExtractOptions, ExtractingPageSource, PageSource};
use crate::index::EmbeddingIndex;
use crate::ingest::{IngestMode, IngestPipeline};

/// Build the splitter described by `config.splitter`. Semantic mode takes
/// the configured embedder from `embedders`, constructing it on a miss;
/// without a provider the splitter falls back to recursive splitting.
pub fn build_splitter(config: &Config, embedders: Arc<EmbedderCache>) -> Result<TextSplitter> {
    let mut builder = TextSplitter::builder()
        .config(config.splitter.split_config()?)
        .token_counter(config.splitter.token_counter()?);
    if config.splitter.semantic_mode && config.embedding.is_enabled() {
        let embedding = config.embedding.clone();
        builder = builder.cached_embedder(embedders, cache_key(&embedding), move || {
            create_embedder(&embedding).map_err(|e| EmbeddingError::Config(format!("{:#}", e)))
        });
    }
    builder.build().context("Invalid splitter configuration")
}

#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub pages: Arc<dyn PageSource>,
    pub splitter: Arc<dyn DocumentSplitter>,
    /// `None` when no embedding provider is configured.
    pub index: Option<Arc<dyn VectorIndex>>,
    /// `None` when no answer provider is configured.
    pub answerer: Option<Arc<dyn Answerer>>,
    pub embedders: Arc<EmbedderCache>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedders = Arc::new(EmbedderCache::new());
        let embedder = resolve_embedder(&config.embedding, &embedders)?;
        let splitter = build_splitter(config, embedders.clone())?;
        let index = embedder.map(|e| Arc::new(EmbeddingIndex::new(e)) as Arc<dyn VectorIndex>);
        let answerer = create_answerer(&config.answer)?;

        tracing::info!(
            embedding = %config.embedding.provider,
            answer = %config.answer.provider,
            mode = %config.ingest.mode,
            "services ready"
        );

        Ok(Self {
            config: Arc::new(config.clone()),
            pages: Arc::new(ExtractingPageSource),
            splitter: Arc::new(splitter),
            index,
            answerer,
            embedders,
        })
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions::from(&self.config.extract)
    }

    pub fn ask_settings(&self) -> AskSettings {
        AskSettings::from(&self.config.answer)
    }

    pub fn ingest_mode(&self) -> Result<IngestMode> {
        self.config.ingest.mode.parse()
    }

    /// The ingestion pipeline, or `None` without a vector index.
    pub fn pipeline(&self) -> Result<Option<IngestPipeline>> {
        let Some(index) = self.index.clone() else {
            return Ok(None);
        };
        let pipeline = IngestPipeline::new(self.pages.clone(), self.splitter.clone(), index)
            .with_mode(self.ingest_mode()?)
            .with_min_chunk_tokens(self.config.ingest.min_chunk_tokens)
            .with_options(self.extract_options());
        Ok(Some(pipeline))
    }
}
