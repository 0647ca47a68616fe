//! HTTP API over a [`SearchEngine`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, and index size |
//! | `POST` | `/search` | Rank tables for a query |
//! | `GET`  | `/tables/{name}/related` | Neighbors within `?hops=N` |
//! | `POST` | `/reload` | Rebuild the index from the snapshot file |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400),
//! `not_found` (404), `timeout` (408), `reranker_unavailable` (503),
//! `embedding_unavailable` (503), `internal` (500).
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use schema_search_core::models::SearchResultItem;
use schema_search_core::strategy::SearchOptions;
use schema_search_core::SearchError;

use crate::config::Config;
use crate::search::SearchEngine;

type AppState = Arc<SearchEngine>;

/// Open the engine for `config` and serve until Ctrl-C.
///
/// `reindex` ignores cached chunk embeddings on startup only.
pub async fn run_server(config: Config, reindex: bool) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let engine = Arc::new(SearchEngine::open(config, reindex).await?);
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("schema-search listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Build the router; callers own binding and serving.
pub fn router(engine: Arc<SearchEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/tables/{name}/related", get(handle_related))
        .route("/reload", post(handle_reload))
        .layer(cors)
        .with_state(engine)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
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

fn app_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
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

/// Map an engine error to a status and code.
impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        let status = match &err {
            SearchError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            SearchError::EmbeddingsDisabled { .. } | SearchError::UnknownVariant { .. } => {
                StatusCode::BAD_REQUEST
            }
            SearchError::EmbeddingUnavailable { .. } | SearchError::RerankerUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SearchError::NotInitialized { .. }
            | SearchError::DimensionMismatch { .. }
            | SearchError::ShapeMismatch { .. } => {
                return internal(err.to_string());
            }
        };
        app_error(status, err.code(), err.to_string())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    tables: usize,
    chunks: usize,
}

async fn handle_health(State(engine): State<AppState>) -> Json<HealthResponse> {
    let index = engine.index();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tables: index.table_count(),
        chunks: index.chunk_count(),
    })
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    limit: Option<usize>,
    hops: Option<usize>,
    #[serde(default)]
    explain: bool,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResultItem>,
}

async fn handle_search(
    State(engine): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;

    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let defaults = engine.default_options();
    let opts = SearchOptions {
        limit: req.limit.unwrap_or(defaults.limit),
        hops: req.hops.unwrap_or(defaults.hops),
        explain: req.explain,
    };
    if opts.limit == 0 {
        return Err(bad_request("limit must be >= 1"));
    }

    let results = engine.search(&req.query, &opts).await.map_err(|e| {
        warn!(error = %e, "search failed");
        AppError::from(e)
    })?;
    Ok(Json(SearchResponse { results }))
}

// ============ GET /tables/{name}/related ============

#[derive(Deserialize)]
struct RelatedParams {
    hops: Option<usize>,
}

#[derive(Serialize)]
struct RelatedResponse {
    table: String,
    related: BTreeSet<String>,
}

async fn handle_related(
    State(engine): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<RelatedParams>,
) -> Result<Json<RelatedResponse>, AppError> {
    let hops = params.hops.unwrap_or(engine.default_options().hops);
    let related = engine
        .related(&name, hops)
        .ok_or_else(|| not_found(format!("table not found: {}", name)))?;
    Ok(Json(RelatedResponse {
        table: name,
        related,
    }))
}

// ============ POST /reload ============

#[derive(Serialize)]
struct ReloadResponse {
    status: &'static str,
    tables: usize,
    chunks: usize,
}

async fn handle_reload(State(engine): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let index = engine.reload().await.map_err(|e| {
        warn!(error = %format!("{:#}", e), "reload failed");
        internal(format!("reload failed: {:#}", e))
    })?;
    Ok(Json(ReloadResponse {
        status: "ok",
        tables: index.table_count(),
        chunks: index.chunk_count(),
    }))
}
