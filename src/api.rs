//! HTTP surface for Pagewise.
//!
//! A compact Axum router over [`DocumentApi`]:
//!
//! - `POST /sessions` – Register a session and return its id.
//! - `POST /sessions/:session_id/documents` – Ingest per-page text, replacing the session's
//!   document. Returns the chunk count.
//! - `POST /sessions/:session_id/chat` – Answer a question with page-attributed segments.
//! - `POST /sessions/:session_id/search` – Return the most similar chunks without generation.
//! - `GET /sessions/:session_id/summary` – Welcome summary plus suggested questions.
//! - `GET /sessions/:session_id/status` – Session lifecycle state.
//! - `DELETE /sessions/:session_id` – Clear the session.
//! - `GET /status` – Model reachability and active session count.
//! - `GET /metrics` – Ingestion and answering counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools.
//!
//! Field names (`success`, `message`, `answer`, `summary`, `questions`) follow the deployed web
//! client. Page attribution in `answer_segments` is a best-effort text match.

use crate::processing::{
    AnswerSegment, DocumentApi, SearchHit, ServiceError, SessionState, SourceDetail,
};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const DEFAULT_SOURCE: &str = "document";
const DEFAULT_QUESTION_COUNT: usize = 3;

/// Build the HTTP router exposing the document API.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route("/sessions", post(create_session::<S>))
        .route("/sessions/:session_id", delete(clear_session::<S>))
        .route(
            "/sessions/:session_id/documents",
            post(upload_document::<S>),
        )
        .route("/sessions/:session_id/chat", post(chat::<S>))
        .route("/sessions/:session_id/search", post(search::<S>))
        .route("/sessions/:session_id/summary", get(summary::<S>))
        .route("/sessions/:session_id/status", get(session_status::<S>))
        .route("/status", get(status::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

#[derive(Serialize)]
struct CreateSessionResponse {
    success: bool,
    session_id: String,
}

async fn create_session<S>(State(service): State<Arc<S>>) -> Json<CreateSessionResponse>
where
    S: DocumentApi,
{
    Json(CreateSessionResponse {
        success: true,
        session_id: service.create_session().await,
    })
}

/// Request body for `POST /sessions/:session_id/documents`.
#[derive(Deserialize)]
struct UploadRequest {
    /// Extracted text of each page, in page order.
    pages: Vec<String>,
    /// Optional document identifier (file name); defaults to `"document"`.
    #[serde(default)]
    source: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    message: String,
    chunks: usize,
    session_id: String,
    filename: String,
}

/// Ingest a document, replacing whatever the session held before.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    let source = request
        .source
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
    let outcome = service
        .ingest_document(&session_id, request.pages, &source)
        .await?;
    tracing::info!(
        session_id = %session_id,
        source = %source,
        chunks = outcome.chunk_count,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        success: true,
        message: format!(
            "Processed '{}' into {} chunks across {} pages",
            outcome.source, outcome.chunk_count, outcome.page_count
        ),
        chunks: outcome.chunk_count,
        session_id: outcome.session_id,
        filename: outcome.source,
    }))
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    success: bool,
    answer: String,
    answer_segments: Vec<AnswerSegment>,
    has_answer: bool,
    /// Comma-separated document names backing the answer.
    sources: String,
    source_details: Vec<SourceDetail>,
    timestamp: String,
    session_id: String,
}

/// Answer a question from the session's document.
async fn chat<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: DocumentApi,
{
    let outcome = service.answer_query(&session_id, &request.message).await?;
    let sources = outcome
        .sources
        .iter()
        .map(|detail| detail.source.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ");
    Ok(Json(ChatResponse {
        success: true,
        answer: outcome.raw_answer,
        answer_segments: outcome.answer_segments,
        has_answer: outcome.has_answer,
        sources,
        source_details: outcome.sources,
        timestamp: now_rfc3339(),
        session_id,
    }))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    success: bool,
    results: Vec<SearchHit>,
}

async fn search<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError>
where
    S: DocumentApi,
{
    let results = service
        .search_document(&session_id, &request.query, request.k)
        .await?;
    Ok(Json(SearchResponse {
        success: true,
        results,
    }))
}

#[derive(Deserialize)]
struct SummaryQuery {
    #[serde(default)]
    count: Option<usize>,
}

#[derive(Serialize)]
struct SummaryResponse {
    success: bool,
    summary: String,
    questions: Vec<String>,
    message: String,
}

/// Welcome summary and suggested questions; degrades to fixed text when generation fails.
async fn summary<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>, AppError>
where
    S: DocumentApi,
{
    let count = query.count.unwrap_or(DEFAULT_QUESTION_COUNT);
    let overview = service.document_overview(&session_id, count).await?;
    let message = if overview.used_fallback {
        "Document ready; the overview uses default suggestions.".to_string()
    } else {
        "Document overview generated.".to_string()
    };
    Ok(Json(SummaryResponse {
        success: true,
        summary: overview.summary,
        questions: overview.questions,
        message,
    }))
}

#[derive(Serialize)]
struct SessionStatusResponse {
    success: bool,
    state: SessionState,
    has_documents: bool,
    document_count: usize,
    page_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

async fn session_status<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
) -> Json<SessionStatusResponse>
where
    S: DocumentApi,
{
    let status = service.session_status(&session_id).await;
    Json(SessionStatusResponse {
        success: true,
        has_documents: status.has_document(),
        state: status.state,
        document_count: status.chunk_count,
        page_count: status.page_count,
        source: status.source,
    })
}

async fn clear_session<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
) -> Json<serde_json::Value>
where
    S: DocumentApi,
{
    let existed = service.clear_session(&session_id).await;
    let message = if existed {
        "Session cleared"
    } else {
        "Session had no documents"
    };
    Json(json!({ "success": true, "message": message }))
}

/// Report model reachability alongside the active session count.
async fn status<S>(State(service): State<Arc<S>>) -> Json<serde_json::Value>
where
    S: DocumentApi,
{
    let health = service.health().await;
    let overall = if health.generator_reachable && health.embedder_reachable {
        "ok"
    } else {
        "degraded"
    };
    Json(json!({
        "success": true,
        "status": overall,
        "health": health,
        "timestamp": now_rfc3339(),
    }))
}

/// Return the ingestion and answering counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "create_session",
                method: "POST",
                path: "/sessions",
                description: "Register a session. Response returns { \"session_id\": string }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/sessions/:session_id/documents",
                description: "Chunk and embed per-page text, replacing the session's document.",
                request_example: Some(json!({
                    "pages": ["Text of page one", "Text of page two"],
                    "source": "report.pdf"
                })),
            },
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/sessions/:session_id/chat",
                description: "Answer a question from the document with page-attributed segments.",
                request_example: Some(json!({ "message": "What is the powerhouse of the cell?" })),
            },
            CommandDescriptor {
                name: "search",
                method: "POST",
                path: "/sessions/:session_id/search",
                description: "Return the chunks most similar to a query, without generation.",
                request_example: Some(json!({ "query": "mitochondria", "k": 3 })),
            },
            CommandDescriptor {
                name: "summary",
                method: "GET",
                path: "/sessions/:session_id/summary",
                description: "Welcome summary and suggested questions for the session's document.",
                request_example: None,
            },
            CommandDescriptor {
                name: "session_status",
                method: "GET",
                path: "/sessions/:session_id/status",
                description: "Lifecycle state (empty, ingesting, ready) and document counts.",
                request_example: None,
            },
            CommandDescriptor {
                name: "clear_session",
                method: "DELETE",
                path: "/sessions/:session_id",
                description: "Drop the session's document and discard in-flight ingestion.",
                request_example: None,
            },
            CommandDescriptor {
                name: "status",
                method: "GET",
                path: "/status",
                description: "Model runtime reachability and active session count.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and answering counters.",
                request_example: None,
            },
        ],
    })
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

struct AppError(ServiceError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::EmptyQuery | ServiceError::InvalidTopK(_) => StatusCode::BAD_REQUEST,
            ServiceError::EmptyIndex(_) | ServiceError::IngestionSuperseded(_) => {
                StatusCode::CONFLICT
            }
            ServiceError::MalformedDocument | ServiceError::Chunking(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::EmbeddingFailure(_) | ServiceError::GenerationFailure(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::DimensionMismatch { .. }
            | ServiceError::EmbeddingModelMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }
        let body = json!({ "success": false, "message": self.0.user_message() });
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self(inner)
    }
}
