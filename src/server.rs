//! HTTP service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Answer `{ user_id, query }` with `{ user_id, query, response }` |
//! | `POST` | `/index` | Rebuild the snapshot from the corpus and serve it |
//! | `GET`  | `/health` | Liveness check |
//!
//! # Error Contract
//!
//! Any failure inside a pipeline run or an index build is returned as
//! `500 Internal Server Error` with the error message as a plain-text body.
//!
//! # CORS
//!
//! Origins listed in `[server].cors_origins` are allowed; an empty list
//! allows any origin. All methods and headers are permitted.

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;
use crate::error::RagError;
use crate::index::{build_index, load_index, SharedIndex};
use crate::pipeline::{ConfiguredResolver, Pipeline, ProviderResolver};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    index: SharedIndex,
    resolver: Arc<dyn ProviderResolver>,
    pipeline: Pipeline,
    /// Serializes index builds; queries never take it.
    build_lock: Arc<Mutex<()>>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Providers are resolved from the config merged with the process
/// environment on every request.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    run_server_with_resolver(config, Arc::new(ConfiguredResolver::from_config(config))).await
}

/// Like [`run_server`], with a caller-supplied [`ProviderResolver`].
pub async fn run_server_with_resolver(
    config: &Config,
    resolver: Arc<dyn ProviderResolver>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.server.bind).await?;
    serve(listener, config, resolver).await
}

/// Serve on an already-bound listener.
///
/// Loads the snapshot at `[index].store_path` if one exists; otherwise the
/// server starts without an index and `/query` fails until `/index` is run.
pub async fn serve(
    listener: TcpListener,
    config: &Config,
    resolver: Arc<dyn ProviderResolver>,
) -> anyhow::Result<()> {
    let index = SharedIndex::default();
    match load_index(&config.index.store_path) {
        Ok(loaded) => index.replace(loaded),
        Err(RagError::IndexNotFound { path }) => {
            tracing::warn!(
                path = %path.display(),
                "no index snapshot found; POST /index to build one"
            );
        }
        Err(e) => tracing::warn!(error = %e, "failed to load index snapshot"),
    }

    let app = router(Arc::new(config.clone()), index, resolver);
    tracing::info!(addr = %listener.local_addr()?, "product query bot listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router around an existing index handle.
pub fn router(
    config: Arc<Config>,
    index: SharedIndex,
    resolver: Arc<dyn ProviderResolver>,
) -> Router {
    let pipeline = Pipeline::new(&config, index.clone(), resolver.clone());
    let cors = cors_layer(&config.server.cors_origins);

    let state = AppState {
        config,
        index,
        resolver,
        pipeline,
        build_lock: Arc::new(Mutex::new(())),
    };

    Router::new()
        .route("/query", post(handle_query))
        .route("/index", post(handle_index))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

// ============ Error response ============

/// Internal error type that converts into a plain-text `500` response.
struct AppError(RagError);

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ============ POST /query ============

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub user_id: String,
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub user_id: String,
    pub query: String,
    pub response: String,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    tracing::info!(user_id = %req.user_id, query = %req.query, "received query");

    let result = state.pipeline.run(&req.query).await?;

    Ok(Json(QueryResponse {
        user_id: req.user_id,
        query: req.query,
        response: result.response,
    }))
}

// ============ POST /index ============

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexResponse {
    pub message: String,
}

async fn handle_index(State(state): State<AppState>) -> Result<Json<IndexResponse>, AppError> {
    let _guard = state.build_lock.lock().await;

    let embedder = state.resolver.embedder();
    let built = build_index(
        &state.config.index.corpus_dir,
        &state.config.index.store_path,
        &state.config,
        embedder.as_ref(),
    )
    .await?;

    let chunks = built.index.len();
    state.index.replace(built.index);
    tracing::info!(chunks, "serving rebuilt index");

    Ok(Json(IndexResponse {
        message: "Indexing complete. Vector store created/updated.".to_string(),
    }))
}
