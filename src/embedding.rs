//! Embedding providers.
//!
//! Concrete implementations of the core [`Embedder`] trait:
//! - **[`OpenAiEmbedder`]**: `POST https://api.openai.com/v1/embeddings`.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama instance.
//! - **`LocalEmbedder`**: fastembed ONNX models, behind the
//!   `local-embeddings-fastembed` feature.
//!
//! Providers are synchronous (`reqwest::blocking`) because the splitter
//! engine is synchronous. Callers on the async runtime go through
//! `tokio::task::spawn_blocking`.
//!
//! # Retry Strategy
//!
//! The HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;

use pagewise_core::embedding::{EmbedderCache, Embedder, EmbeddingError};

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Delay before retry number `attempt` (1-based).
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// Send a JSON request with retry/backoff and return the decoded response body.
///
/// `send` is called once per attempt; `label` names the upstream in errors.
fn post_with_retry<F>(label: &str, max_retries: u32, send: F) -> Result<serde_json::Value, EmbeddingError>
where
    F: Fn() -> reqwest::Result<reqwest::blocking::Response>,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff(attempt);
            tracing::debug!(label, attempt, ?delay, "retrying embedding request");
            std::thread::sleep(delay);
        }

        match send() {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().map_err(|e| {
                        EmbeddingError::Request(format!("{} returned invalid JSON: {}", label, e))
                    });
                }

                let message = response.text().unwrap_or_default();
                let err = EmbeddingError::Api {
                    status: status.as_u16(),
                    message: format!("{}: {}", label, message),
                };

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                last_err = Some(EmbeddingError::Request(format!("{} request failed: {}", label, e)));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        EmbeddingError::Request(format!("{} embedding failed after retries", label))
    }))
}

fn build_client(timeout: Duration) -> Result<reqwest::blocking::Client, EmbeddingError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EmbeddingError::Config(format!("failed to build HTTP client: {}", e)))
}

fn json_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|arr| arr.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
}

/// Embed `texts` in batches of `batch_size`, checking each batch's vector count.
fn embed_batched<F>(texts: &[String], batch_size: usize, mut embed_batch: F) -> Result<Vec<Vec<f32>>, EmbeddingError>
where
    F: FnMut(&[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>,
{
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = embed_batch(batch)?;
        if vectors.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                actual: vectors.len(),
            });
        }
        out.extend(vectors);
    }
    Ok(out)
}

// ============ OpenAI ============

/// OpenAI embeddings API client.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbedder {
    model: String,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model,
            api_key,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let client = build_client(self.timeout)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = post_with_retry("OpenAI", self.max_retries, || {
            client
                .post(OPENAI_EMBEDDINGS_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
        })?;

        parse_openai_response(&json)
    }
}

impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        embed_batched(texts, self.batch_size, |batch| self.embed_batch(batch))
    }
}

/// Extract `data[].embedding`, ordered by each item's `index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::Request("Invalid OpenAI response: missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let vector = item
            .get("embedding")
            .and_then(json_vector)
            .ok_or_else(|| EmbeddingError::Request("Invalid OpenAI response: missing embedding".into()))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map_or(position, |i| i as usize);
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embeddings from a local Ollama instance.
///
/// Requires an embedding model to be pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    url: String,
    batch_size: usize,
    max_retries: u32,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let client = build_client(self.timeout)?;
        let endpoint = format!("{}/api/embed", self.url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = post_with_retry("Ollama", self.max_retries, || {
            client
                .post(&endpoint)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
        })
        .map_err(|e| match e {
            EmbeddingError::Request(msg) => EmbeddingError::Request(format!(
                "{} (is Ollama running at {}?)",
                msg, self.url
            )),
            other => other,
        })?;

        parse_ollama_response(&json)
    }
}

impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        embed_batched(texts, self.batch_size, |batch| self.embed_batch(batch))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbeddingError::Request("Invalid Ollama response: missing embeddings array".into()))?;

    embeddings
        .iter()
        .map(|e| {
            json_vector(e).ok_or_else(|| {
                EmbeddingError::Request("Invalid Ollama response: embedding is not an array".into())
            })
        })
        .collect()
}

// ============ Local (fastembed) ============

/// Local ONNX inference via fastembed.
///
/// Models are downloaded from Hugging Face on first use and cached; after
/// that no network calls are made.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    batch_size: usize,
    model: std::sync::Mutex<fastembed::TextEmbedding>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let fastembed_model = config_to_fastembed_model(&model_name)?;

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            batch_size: config.batch_size,
            model: std::sync::Mutex::new(model),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self.model.lock().unwrap_or_else(|e| e.into_inner());
        model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| EmbeddingError::Request(format!("Local embedding failed: {}", e)))
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ),
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
///
/// `"disabled"` is an error here; use [`resolve_embedder`] when the
/// provider may be off.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Key under which the embedder for `config` lives in an [`EmbedderCache`].
pub fn cache_key(config: &EmbeddingConfig) -> String {
    format!(
        "{}:{}",
        config.provider,
        config.model.as_deref().unwrap_or_default()
    )
}

/// The configured embedder, shared through `cache`, or `None` when disabled.
pub fn resolve_embedder(
    config: &EmbeddingConfig,
    cache: &EmbedderCache,
) -> Result<Option<Arc<dyn Embedder>>> {
    if !config.is_enabled() {
        return Ok(None);
    }
    let key = cache_key(config);
    let embedder = cache.get_or_try_insert(&key, || create_embedder(config))?;
    tracing::debug!(key, model = embedder.model_name(), "resolved embedder");
    Ok(Some(embedder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serve canned HTTP responses in order, one per connection.
    fn mock_server(responses: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        std::thread::spawn(move || {
            for (status, body) in responses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut reader = BufReader::new(stream);
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut request_body = vec![0u8; content_length];
                reader.read_exact(&mut request_body).unwrap();

                let mut stream = reader.into_inner();
                let reply = format!(
                    "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(reply.as_bytes()).unwrap();
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn ollama_config(url: &str, max_retries: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            url: Some(url.to_string()),
            max_retries,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_backoff_schedule() {
        let secs: Vec<u64> = (1..=8).map(|a| backoff(a).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 32, 32]);
    }

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_response_missing_data() {
        let err = parse_openai_response(&serde_json::json!({ "object": "list" })).unwrap_err();
        assert!(err.to_string().contains("missing data array"));
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.5], [1.0, 0.0]] });
        assert_eq!(parse_ollama_response(&json).unwrap().len(), 2);
        assert!(parse_ollama_response(&serde_json::json!({ "embeddings": [1] })).is_err());
    }

    #[test]
    fn test_embed_batched_splits_and_checks_counts() {
        let mut calls = Vec::new();
        let out = embed_batched(&texts(&["a", "b", "c"]), 2, |batch| {
            calls.push(batch.len());
            Ok(batch.iter().map(|_| vec![1.0]).collect())
        })
        .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(calls, vec![2, 1]);

        let err = embed_batched(&texts(&["a", "b"]), 8, |_| Ok(vec![vec![1.0]])).unwrap_err();
        assert!(matches!(err, EmbeddingError::CountMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_ollama_retries_server_errors() {
        let (url, hits) = mock_server(vec![
            (500, "{\"error\":\"loading\"}".to_string()),
            (200, "{\"embeddings\":[[1.0,0.0],[0.0,1.0]]}".to_string()),
        ]);
        let embedder = OllamaEmbedder::new(&ollama_config(&url, 1)).unwrap();
        let vectors = embedder.embed_documents(&texts(&["one", "two"])).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ollama_fails_fast_on_client_error() {
        let (url, hits) = mock_server(vec![(400, "{\"error\":\"bad model\"}".to_string())]);
        let embedder = OllamaEmbedder::new(&ollama_config(&url, 3)).unwrap();
        let err = embedder.embed_documents(&texts(&["one"])).unwrap_err();
        assert!(matches!(err, EmbeddingError::Api { status: 400, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ollama_count_mismatch() {
        let (url, _) = mock_server(vec![(200, "{\"embeddings\":[[1.0]]}".to_string())]);
        let embedder = OllamaEmbedder::new(&ollama_config(&url, 0)).unwrap();
        let err = embedder.embed_documents(&texts(&["one", "two"])).unwrap_err();
        assert!(matches!(err, EmbeddingError::CountMismatch { .. }));
    }

    #[test]
    fn test_resolve_disabled_is_none() {
        let cache = EmbedderCache::new();
        let resolved = resolve_embedder(&EmbeddingConfig::default(), &cache).unwrap();
        assert!(resolved.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_resolve_caches_by_provider_and_model() {
        let cache = EmbedderCache::new();
        let config = ollama_config("http://localhost:11434", 0);
        let a = resolve_embedder(&config, &cache).unwrap().unwrap();
        let b = resolve_embedder(&config, &cache).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(a.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "cohere".to_string(),
            model: Some("x".to_string()),
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
