//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/generate-embeddings` | Ingest a document into the vector index |
//! | `POST` | `/api/view-pdf` | Per-page extraction report |
//! | `POST` | `/api/ask-question` | Answer a question from one document |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "path must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `answerer_disabled` (400),
//! `upstream` (502), `internal` (500).
//!
//! A failed ingestion is not an HTTP error: `/api/generate-embeddings`
//! returns the report with `status = "failed"` and HTTP 422.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends
//! can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::{ask, AskError, AskResponse};
use crate::config::Config;
use crate::extract::{default_document_id, page_report, DocumentSource, ExtractError, PageReport};
use crate::ingest::{IngestError, IngestRequest};
use crate::services::Services;

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated; returns an error if binding fails.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config)?;
    let bind_addr = config.server.bind.clone();

    let app = router(services);

    println!("pagewise listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The API router over `services`.
pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/generate-embeddings", post(handle_generate_embeddings))
        .route("/api/view-pdf", post(handle_view_pdf))
        .route("/api/ask-question", post(handle_ask_question))
        .layer(cors)
        .with_state(services)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn internal(message: impl Into<String>) -> AppError {
    app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<AskError> for AppError {
    fn from(err: AskError) -> Self {
        let message = err.to_string();
        match err {
            AskError::BadRequest(_) => bad_request(message),
            AskError::NotFound(_) => not_found(message),
            AskError::AnswererDisabled => {
                app_error(StatusCode::BAD_REQUEST, "answerer_disabled", message)
            }
            AskError::Upstream(_) => app_error(StatusCode::BAD_GATEWAY, "upstream", message),
            AskError::Internal(_) => internal(message),
        }
    }
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        let message = err.to_string();
        match err {
            ExtractError::Io { ref source, .. } if source.kind() == ErrorKind::NotFound => {
                not_found(message)
            }
            ExtractError::Io { .. } => internal(message),
            ExtractError::UnsupportedType(_)
            | ExtractError::Pdf(_)
            | ExtractError::Json(_)
            | ExtractError::InvalidPages(_) => bad_request(message),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        internal(err.to_string())
    }
}

fn required(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/generate-embeddings ============

#[derive(Deserialize)]
struct GenerateEmbeddingsRequest {
    path: String,
    #[serde(default)]
    filename: Option<String>,
    /// Document id; defaults to the file stem.
    #[serde(default)]
    id: Option<String>,
}

async fn handle_generate_embeddings(
    State(services): State<Services>,
    Json(req): Json<GenerateEmbeddingsRequest>,
) -> Result<Response, AppError> {
    required(&req.path, "path")?;
    let pipeline = services
        .pipeline()
        .map_err(|e| internal(format!("{:#}", e)))?
        .ok_or_else(|| bad_request("embedding provider is disabled"))?;

    let document_id = req
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| default_document_id(Path::new(&req.path)));

    let report = pipeline
        .ingest(IngestRequest {
            source: DocumentSource::new(&req.path),
            document_id,
            filename: req.filename,
        })
        .await?;

    let status = if report.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(report)).into_response())
}

// ============ POST /api/view-pdf ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewPdfRequest {
    path: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default = "default_include_content")]
    include_content: bool,
}

fn default_include_content() -> bool {
    true
}

async fn handle_view_pdf(
    State(services): State<Services>,
    Json(req): Json<ViewPdfRequest>,
) -> Result<Json<PageReport>, AppError> {
    required(&req.path, "path")?;
    let document_id = req
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| default_document_id(Path::new(&req.path)));

    let source = DocumentSource::new(&req.path);
    let pages_source = services.pages.clone();
    let doc = document_id.clone();
    let pages = tokio::task::spawn_blocking(move || pages_source.load_pages(&source, &doc))
        .await
        .map_err(|e| internal(e.to_string()))??;

    Ok(Json(page_report(
        &document_id,
        pages,
        &services.extract_options(),
        req.include_content,
    )))
}

// ============ POST /api/ask-question ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskQuestionRequest {
    question: String,
    document_id: String,
}

async fn handle_ask_question(
    State(services): State<Services>,
    Json(req): Json<AskQuestionRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let index = services
        .index
        .as_deref()
        .ok_or_else(|| bad_request("embedding provider is disabled"))?;

    let response = ask(
        index,
        services.answerer.as_deref(),
        services.ask_settings(),
        &req.question,
        &req.document_id,
    )
    .await?;
    Ok(Json(response))
}
