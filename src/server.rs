//! HTTP server.
//!
//! Two trust domains share one router: scanner agents authenticate the
//! upload endpoint with a shared-secret `X-API-Key` header, while query
//! callers present a bearer token (standing in for the out-of-scope
//! session layer). The upload handler does only fast work — persist the
//! file, commit the `queued` row, enqueue — and acknowledges with 202
//! before any processing happens.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/api/v1/upload` | `X-API-Key` | Accept a document for ingestion |
//! | `POST` | `/api/v1/query` | `Authorization: Bearer` | Answer a query over the corpus |
//! | `GET`  | `/api/v1/documents` | `Authorization: Bearer` | Recent records with status |
//! | `GET`  | `/health` | none | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unauthorized", "message": "invalid API key" } }
//! ```
//!
//! Error codes: `unauthorized` (401), `bad_request` (400),
//! `backend_unavailable` (503), `internal` (500).

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::ai::AiHandle;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::models::{DocumentRecord, IngestJob};
use crate::query::{self, QueryError};
use crate::store;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_AGENT: &str = "default_agent";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub ai: Arc<AiHandle>,
    pub dispatcher: Dispatcher,
    api_key: String,
    query_token: String,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        pool: SqlitePool,
        ai: Arc<AiHandle>,
        dispatcher: Dispatcher,
    ) -> anyhow::Result<Self> {
        let api_key = config.server.api_key()?;
        let query_token = config.server.query_token()?;
        Ok(Self {
            config,
            pool,
            ai,
            dispatcher,
            api_key,
            query_token,
        })
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/upload", post(handle_upload))
        .route("/api/v1/query", post(handle_query))
        .route("/api/v1/documents", get(handle_documents))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is terminated.
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let bind_addr = state.config.server.bind.clone();
    let app = build_router(state);

    tracing::info!(%bind_addr, "corpus server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn backend_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "backend_unavailable",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ Auth ============

fn require_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    match provided {
        Some(key) if key == state.api_key => Ok(()),
        _ => Err(unauthorized("invalid API key")),
    }
}

fn require_query_token(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == state.query_token => Ok(()),
        _ => Err(unauthorized("missing or invalid bearer token")),
    }
}

// ============ POST /api/v1/upload ============

#[derive(Serialize)]
struct UploadResponse {
    status: &'static str,
    filename: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    require_api_key(&state, &headers)?;

    let source_agent = headers
        .get("x-agent-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_AGENT)
        .to_string();

    // Find the `document` field.
    let mut payload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("document") {
            continue;
        }
        let filename = sanitize_filename(field.file_name().unwrap_or_default());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read document field: {}", e)))?;
        payload = Some((filename, bytes.to_vec()));
        break;
    }

    let Some((filename, bytes)) = payload else {
        return Err(bad_request("no document file provided"));
    };

    // Persist to the shared uploads directory under a collision-free name;
    // ownership of this file passes to the worker at dispatch.
    let uploads_dir = &state.config.storage.uploads_dir;
    tokio::fs::create_dir_all(uploads_dir)
        .await
        .map_err(|e| internal(format!("could not create uploads dir: {}", e)))?;
    let file_path = uploads_dir.join(format!("{}_{}", uuid::Uuid::new_v4(), filename));
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| internal(format!("could not persist upload: {}", e)))?;

    let upload_path = file_path.to_string_lossy().to_string();
    let (document_id, disposition) =
        match store::register_upload(&state.pool, &filename, &source_agent, &upload_path).await {
            Ok(result) => result,
            Err(e) => {
                // Best effort: don't leave an unreferenced upload behind.
                let _ = tokio::fs::remove_file(&file_path).await;
                return Err(internal(format!("could not record upload: {}", e)));
            }
        };

    tracing::info!(document_id, %filename, %source_agent, ?disposition, "upload accepted");

    state
        .dispatcher
        .enqueue(IngestJob {
            document_id,
            file_path,
        })
        .await
        // The queued row survives; the startup sweep will redeliver it.
        .map_err(|e| internal(format!("could not dispatch job: {}", e)))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            status: "queued for processing",
            filename,
        }),
    ))
}

/// Strip path components and unsafe characters from a client-supplied
/// filename.
fn sanitize_filename(raw: &str) -> String {
    let base = std::path::Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches('.').to_string();
    if trimmed.is_empty() {
        "upload.bin".to_string()
    } else {
        trimmed
    }
}

// ============ POST /api/v1/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

async fn handle_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_query_token(&state, &headers)?;

    let top_k = state.config.retrieval.top_k;
    match query::answer(&state.ai, top_k, &request.query).await {
        Ok(answer) => Ok(Json(answer)),
        Err(QueryError::EmptyQuery) => Err(bad_request("query is required")),
        Err(QueryError::Transient(e)) => {
            tracing::warn!(error = %format!("{:#}", e), "query failed");
            Err(backend_unavailable("AI backend unavailable, try again"))
        }
    }
}

// ============ GET /api/v1/documents ============

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentRecord>,
}

async fn handle_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DocumentsResponse>, AppError> {
    require_query_token(&state, &headers)?;

    let documents = store::list_recent(&state.pool, 100)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(DocumentsResponse { documents }))
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
