//! TOML configuration.
//!
//! Every section is optional; a missing section takes its defaults. See
//! `config/pagewise.example.toml` for a commented example.
//!
//! API keys are never read from the file: the OpenAI providers take
//! `OPENAI_API_KEY` from the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use pagewise_core::splitter::{SplitConfig, MIN_PART_TOKENS};
use pagewise_core::strategy::BreakpointThreshold;
use pagewise_core::tokens::TokenCounter;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub splitter: SplitterConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SplitterConfig {
    #[serde(default = "default_max_tokens_single")]
    pub max_tokens_single: usize,
    #[serde(default = "default_rec_chunk_tokens")]
    pub rec_chunk_tokens: usize,
    #[serde(default = "default_rec_overlap_tokens")]
    pub rec_overlap_tokens: usize,
    #[serde(default)]
    pub legal_mode: bool,
    #[serde(default)]
    pub semantic_mode: bool,
    #[serde(default = "default_breakpoint")]
    pub breakpoint: String,
    #[serde(default)]
    pub breakpoint_amount: Option<f32>,
    #[serde(default = "default_span_min_chars")]
    pub span_min_chars: usize,
    #[serde(default)]
    pub max_chunks: Option<usize>,
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            max_tokens_single: default_max_tokens_single(),
            rec_chunk_tokens: default_rec_chunk_tokens(),
            rec_overlap_tokens: default_rec_overlap_tokens(),
            legal_mode: false,
            semantic_mode: false,
            breakpoint: default_breakpoint(),
            breakpoint_amount: None,
            span_min_chars: default_span_min_chars(),
            max_chunks: None,
            tokenizer: default_tokenizer(),
        }
    }
}

fn default_max_tokens_single() -> usize {
    512
}
fn default_rec_chunk_tokens() -> usize {
    200
}
fn default_rec_overlap_tokens() -> usize {
    25
}
fn default_breakpoint() -> String {
    "percentile".to_string()
}
fn default_span_min_chars() -> usize {
    40
}
fn default_tokenizer() -> String {
    "cl100k".to_string()
}

impl SplitterConfig {
    pub fn breakpoint_threshold(&self) -> Result<BreakpointThreshold> {
        BreakpointThreshold::from_name(&self.breakpoint, self.breakpoint_amount).with_context(|| {
            format!(
                "Unknown splitter.breakpoint: '{}'. Must be percentile, standard_deviation, interquartile, or gradient.",
                self.breakpoint
            )
        })
    }

    pub fn token_counter(&self) -> Result<TokenCounter> {
        TokenCounter::from_name(&self.tokenizer).with_context(|| {
            format!(
                "Unknown splitter.tokenizer: '{}'. Must be cl100k or estimate.",
                self.tokenizer
            )
        })
    }

    /// The engine-level settings for this section.
    pub fn split_config(&self) -> Result<SplitConfig> {
        Ok(SplitConfig {
            max_tokens_single: self.max_tokens_single,
            rec_chunk_tokens: self.rec_chunk_tokens,
            rec_overlap_tokens: self.rec_overlap_tokens,
            legal_mode: self.legal_mode,
            semantic_mode: self.semantic_mode,
            breakpoint: self.breakpoint_threshold()?,
            span_min_chars: self.span_min_chars,
            max_chunks: self.max_chunks,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Ollama base URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default = "default_true")]
    pub skip_empty_pages: bool,
    /// Run the boilerplate cleaner over page text before reporting it.
    #[serde(default = "default_true")]
    pub trim_whitespace: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_pages: None,
            skip_empty_pages: true,
            trim_whitespace: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// `pages`, `combined`, or `spans`.
    #[serde(default = "default_ingest_mode")]
    pub mode: String,
    #[serde(default = "default_min_chunk_tokens")]
    pub min_chunk_tokens: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: default_ingest_mode(),
            min_chunk_tokens: default_min_chunk_tokens(),
        }
    }
}

fn default_ingest_mode() -> String {
    "pages".to_string()
}
fn default_min_chunk_tokens() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_answer_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_answer_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_context_chunks")]
    pub context_chunks: usize,
    #[serde(default = "default_answer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_answer_model(),
            temperature: default_temperature(),
            max_tokens: default_answer_max_tokens(),
            candidate_k: default_candidate_k(),
            context_chunks: default_context_chunks(),
            timeout_secs: default_answer_timeout_secs(),
        }
    }
}

fn default_answer_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_answer_max_tokens() -> u32 {
    600
}
fn default_candidate_k() -> usize {
    10
}
fn default_context_chunks() -> usize {
    4
}
fn default_answer_timeout_secs() -> u64 {
    60
}

impl AnswerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate splitter
    let s = &config.splitter;
    if s.max_tokens_single == 0 {
        bail!("splitter.max_tokens_single must be > 0");
    }
    if s.rec_chunk_tokens < MIN_PART_TOKENS {
        bail!("splitter.rec_chunk_tokens must be >= {}", MIN_PART_TOKENS);
    }
    if s.rec_overlap_tokens >= s.rec_chunk_tokens {
        bail!("splitter.rec_overlap_tokens must be less than splitter.rec_chunk_tokens");
    }
    if s.max_chunks == Some(0) {
        bail!("splitter.max_chunks must be > 0 when set");
    }
    s.breakpoint_threshold()?;
    match s.tokenizer.as_str() {
        "cl100k" | "cl100k_base" | "estimate" => {}
        other => bail!(
            "Unknown splitter.tokenizer: '{}'. Must be cl100k or estimate.",
            other
        ),
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if s.semantic_mode && !config.embedding.is_enabled() {
        bail!("splitter.semantic_mode requires an embedding provider");
    }

    // Validate ingest
    match config.ingest.mode.as_str() {
        "pages" | "combined" | "spans" => {}
        other => bail!(
            "Unknown ingest.mode: '{}'. Must be pages, combined, or spans.",
            other
        ),
    }

    // Validate answer
    match config.answer.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown answer provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.answer.candidate_k == 0 {
        bail!("answer.candidate_k must be >= 1");
    }
    if config.answer.context_chunks == 0 || config.answer.context_chunks > config.answer.candidate_k {
        bail!("answer.context_chunks must be in [1, answer.candidate_k]");
    }

    Ok(())
}
