mod events;
mod projects;
mod sessions;
mod sse;
mod status;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use logview_sessions::{EngineError, SessionScanner, TailRegistry};

/// Listing responses must never be served from a cache.
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState {
    pub scanner: Arc<SessionScanner>,
    pub registry: TailRegistry,
    pub poll_interval: Duration,
}

impl AppState {
    pub fn new(scanner: Arc<SessionScanner>, poll_interval: Duration) -> Self {
        Self {
            scanner,
            registry: TailRegistry::new(),
            poll_interval,
        }
    }
}

pub fn create_router(state: AppState, base_path: Option<&str>) -> Result<Router, String> {
    let base = normalize_base_path(base_path.unwrap_or(""))?;

    let api = Router::new()
        .route("/api/projects", get(projects::list_projects))
        .route("/api/sessions", get(sessions::list_sessions))
        .route("/api/session/{id}/metadata", get(sessions::get_metadata))
        .route("/api/events/list", get(events::list_events))
        .route("/api/events/{session_id}/{line}", get(events::get_event))
        .route("/stream/{session_id}", get(sse::stream_events))
        .route("/api/refresh", post(status::refresh))
        .route("/api/status", get(status::get_status))
        .layer(CorsLayer::permissive())
        .with_state(state);

    if base.is_empty() {
        Ok(api)
    } else {
        Ok(Router::new().nest(&base, api))
    }
}

/// Validate a route prefix: it must start with `/` and must not contain
/// `..`. Trailing slashes are dropped, so `/` means no prefix.
pub fn normalize_base_path(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(String::new());
    }
    if !raw.starts_with('/') {
        return Err(format!("Base path must start with '/': {}", raw));
    }
    if raw.contains("..") {
        return Err(format!("Base path must not contain '..': {}", raw));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn engine_error(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::Parse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Read { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::Transport => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_server_error() {
        tracing::warn!("Request failed: {}", err);
    }
    (status, err.to_string())
}

/// Run blocking file I/O off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> logview_sessions::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(engine_error)
}

fn no_cache() -> [(header::HeaderName, HeaderValue); 1] {
    [(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE))]
}
