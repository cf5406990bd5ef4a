//! Question answering over an ingested document.
//!
//! [`ask`] retrieves the closest chunks of one document, joins the best of
//! them into a context block, and hands it to an [`Answerer`]. The
//! response carries the answer, the chunks used as sources (with the
//! question words each one contains), and retrieval counters.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use pagewise_core::store::{ScoredChunk, VectorIndex};
use pagewise_core::{ChunkBox, ChunkType};

use crate::config::AnswerConfig;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub context_answer: String,
    #[serde(default)]
    pub additional_info: String,
}

/// Produces an answer to `question` from `context`.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, context: &str, question: &str) -> Result<Answer>;
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("answer provider is disabled")]
    AnswererDisabled,

    #[error("answer provider failed: {0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

/// Retrieval limits for [`ask`].
#[derive(Debug, Clone, Copy)]
pub struct AskSettings {
    /// Chunks requested from the index.
    pub candidate_k: usize,
    /// Chunks passed to the answerer.
    pub context_chunks: usize,
}

impl Default for AskSettings {
    fn default() -> Self {
        Self::from(&AnswerConfig::default())
    }
}

impl From<&AnswerConfig> for AskSettings {
    fn from(config: &AnswerConfig) -> Self {
        Self {
            candidate_k: config.candidate_k,
            context_chunks: config.context_chunks,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub document_id: String,
    pub chunk_id: String,
    pub page_number: Option<u32>,
    pub heading: Option<String>,
    pub chunk_type: ChunkType,
    pub token_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<ChunkBox>,
    pub text_match: String,
    pub page_indicator: String,
    /// Cosine similarity of the chunk to the question.
    pub confidence: f32,
    pub highlights: Vec<String>,
}

impl Source {
    fn from_scored(scored: ScoredChunk, keywords: &[String]) -> Self {
        let chunk = scored.chunk;
        let page_indicator = match chunk.page_number {
            Some(n) => format!("Page {}", n),
            None => "Page n/a".to_string(),
        };
        let highlights = highlights(&chunk.content, keywords);
        Self {
            document_id: chunk.document_id,
            chunk_id: chunk.chunk_id,
            page_number: chunk.page_number,
            heading: chunk.heading,
            chunk_type: chunk.chunk_type,
            token_count: chunk.token_count,
            bbox: chunk.bbox,
            text_match: chunk.content,
            page_indicator,
            confidence: scored.score,
            highlights,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskDebug {
    pub chunks_analyzed: usize,
    pub chunks_used: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: Answer,
    pub sources: Vec<Source>,
    pub debug: AskDebug,
}

/// Question words with surrounding punctuation stripped, first occurrence kept.
pub fn question_keywords(question: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in question.split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if !word.is_empty() && !out.iter().any(|w| w.eq_ignore_ascii_case(word)) {
            out.push(word.to_string());
        }
    }
    out
}

/// Keywords that occur in `text` as whole words, ignoring case.
pub fn highlights(text: &str, keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .filter(|kw| {
            RegexBuilder::new(&format!(r"\b{}\b", regex::escape(kw)))
                .case_insensitive(true)
                .build()
                .is_ok_and(|re| re.is_match(text))
        })
        .cloned()
        .collect()
}

/// Answer `question` from the indexed chunks of `document_id`.
pub async fn ask(
    index: &dyn VectorIndex,
    answerer: Option<&dyn Answerer>,
    settings: AskSettings,
    question: &str,
    document_id: &str,
) -> Result<AskResponse, AskError> {
    let question = question.trim();
    let document_id = document_id.trim();
    if question.is_empty() || document_id.is_empty() {
        return Err(AskError::BadRequest(
            "Question and documentId are required.".to_string(),
        ));
    }
    let answerer = answerer.ok_or(AskError::AnswererDisabled)?;

    let candidates = index
        .query(document_id, question, settings.candidate_k)
        .await
        .map_err(|e| AskError::Internal(format!("{:#}", e)))?;
    let analyzed = candidates.len();

    let top: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter(|c| c.chunk.document_id == document_id)
        .take(settings.context_chunks)
        .collect();
    if top.is_empty() {
        return Err(AskError::NotFound(
            "No relevant content found for this document.".to_string(),
        ));
    }

    let context = top
        .iter()
        .map(|c| c.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    let answer = answerer
        .answer(&context, question)
        .await
        .map_err(|e| AskError::Upstream(format!("{:#}", e)))?;

    let keywords = question_keywords(question);
    let used = top.len();
    let sources = top
        .into_iter()
        .map(|c| Source::from_scored(c, &keywords))
        .collect();

    tracing::info!(document_id, analyzed, used, "answered question");
    Ok(AskResponse {
        answer,
        sources,
        debug: AskDebug {
            chunks_analyzed: analyzed,
            chunks_used: used,
        },
    })
}

/// The strict-JSON answering prompt.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        r#"Answer the following question in **strict JSON format** with exactly two fields:
"contextAnswer" and "additionalInfo".

CRITICAL RULES:
1. For monetary amounts:
   - Always use the exact format found in context (e.g. "9.800,96€" not "9800.96 Euro")
   - Never round or modify numbers
   - Preserve all currency symbols and formatting

2. Source prioritization:
   - Primary source MUST contain the exact numerical value
   - If multiple amounts exist, use the most specific one
   - Always include the page reference where the amount appears

3. Answer structure:
   - "contextAnswer" must contain:
     * The exact numerical value
     * The page number where found
     * Minimal surrounding context
   - "additionalInfo" should only contain:
     * Payment terms/conditions if explicitly mentioned
     * Tax/VAT details if specified
     * Leave empty if no relevant additions exist

CONTEXT HIERARCHY:
1. Exact amounts with page numbers
2. General mentions of totals
3. Payment terms (only if no amounts found)

BAD EXAMPLE:
{{
  "contextAnswer": "The contract mentions a total sum",
  "additionalInfo": "See payment terms on page 5"
}}

GOOD EXAMPLE:
{{
  "contextAnswer": "The total amount is 9.800,96€ (Page 7)",
  "additionalInfo": "Payment due in 2 installments (Page 5)"
}}

Current Context:
{context}

Question: {question}

Respond ONLY with valid JSON:
"#
    )
}

/// Parse the model's reply, tolerating a fenced code block around the JSON.
pub fn parse_answer(raw: &str) -> Result<Answer> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).with_context(|| format!("Failed to parse response: {}", raw))
}

/// OpenAI chat completions answerer. Requires `OPENAI_API_KEY`.
pub struct OpenAiAnswerer {
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiAnswerer {
    pub fn new(config: &AnswerConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl Answerer for OpenAiAnswerer {
    async fn answer(&self, context: &str, question: &str) -> Result<Answer> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "user", "content": build_prompt(context, question) }
            ],
        });

        let response = client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("OpenAI chat request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))?;

        parse_answer(content)
    }
}

/// The configured answerer, or `None` when disabled.
pub fn create_answerer(config: &AnswerConfig) -> Result<Option<Arc<dyn Answerer>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Arc::new(OpenAiAnswerer::new(config)?))),
        other => bail!("Unknown answer provider: {}", other),
    }
}
