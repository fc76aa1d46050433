//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/scan` | Scan the configured folder and store the results (`?dry_run=true` skips storage) |
//! | `GET`  | `/transcripts` | Stored transcripts, newest first (`?limit=N`) |
//! | `GET`  | `/transcripts/{id}` | One transcript with content and summary |
//! | `POST` | `/transcripts/{id}/summarize` | Generate (or regenerate) the summary |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "transcript not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `scan_failed` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::activity::scan_sink;
use crate::config::Config;
use crate::db;
use crate::migrate::create_schema;
use crate::models::{ScanError, StoredTranscript, Summary};
use crate::scan::run_folder_scan;
use crate::store::{self, PersistStats};
use crate::summarize::summarize_stored;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;

    let app = router(Arc::new(config.clone()), pool);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "HTTP server listening");
    println!("Transcript Harness listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// The API routes over an already migrated pool.
pub fn router(config: Arc<Config>, pool: SqlitePool) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/scan", post(handle_scan))
        .route("/transcripts", get(handle_list))
        .route("/transcripts/{id}", get(handle_get))
        .route("/transcripts/{id}/summarize", post(handle_summarize))
        .layer(cors)
        .with_state(AppState { config, pool })
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn scan_failed(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "scan_failed",
        message: format!("{:#}", err),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
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

// ============ POST /scan ============

#[derive(Deserialize, Default)]
struct ScanParams {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScannedRecord {
    file_name: String,
    display_title: String,
    source_url: String,
    associated_video_file_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanResponse {
    matched_count: usize,
    total_count: usize,
    records: Vec<ScannedRecord>,
    errors: Vec<ScanError>,
    /// Absent on a dry run.
    #[serde(skip_serializing_if = "Option::is_none")]
    stored: Option<PersistStats>,
}

async fn handle_scan(
    State(state): State<AppState>,
    Query(params): Query<ScanParams>,
) -> Result<Json<ScanResponse>, AppError> {
    let sink = scan_sink(&state.pool, params.dry_run);
    let report = run_folder_scan(&state.config, sink.as_ref())
        .await
        .map_err(scan_failed)?;

    let stored = if params.dry_run {
        None
    } else {
        Some(
            store::persist_report(&state.pool, &report)
                .await
                .map_err(internal)?,
        )
    };

    Ok(Json(ScanResponse {
        matched_count: report.matched_count,
        total_count: report.total_count,
        records: report
            .records
            .into_iter()
            .map(|r| ScannedRecord {
                file_name: r.file_name,
                display_title: r.display_title,
                source_url: r.source_url,
                associated_video_file_name: r.associated_video_file_name,
            })
            .collect(),
        errors: report.errors,
        stored,
    }))
}

// ============ GET /transcripts ============

#[derive(Deserialize)]
struct ListParams {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
    transcripts: Vec<StoredTranscript>,
}

async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(bad_request(format!(
            "limit must be between 1 and {}",
            MAX_LIST_LIMIT
        )));
    }
    let transcripts = store::list_transcripts(&state.pool, limit)
        .await
        .map_err(internal)?;
    Ok(Json(ListResponse { transcripts }))
}

// ============ GET /transcripts/{id} ============

async fn load(state: &AppState, id: &str) -> Result<StoredTranscript, AppError> {
    store::get_transcript(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("transcript not found: {}", id)))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredTranscript>, AppError> {
    load(&state, &id).await.map(Json)
}

// ============ POST /transcripts/{id}/summarize ============

async fn handle_summarize(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Summary>, AppError> {
    let openai = state
        .config
        .openai()
        .map_err(|e| bad_request(e.to_string()))?;
    let transcript = load(&state, &id).await?;
    let summary = summarize_stored(openai, &state.pool, &transcript)
        .await
        .map_err(internal)?;
    Ok(Json(summary))
}
