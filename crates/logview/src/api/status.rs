use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;

use logview_sessions::ScanStatus;

use super::AppState;

pub async fn get_status(State(state): State<AppState>) -> Json<ScanStatus> {
    Json(state.scanner.status())
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions_scanned: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions_cached: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Force a rescan regardless of snapshot age.
pub async fn refresh(State(state): State<AppState>) -> (StatusCode, Json<RefreshResponse>) {
    match state.scanner.force_rescan().await {
        Ok(snapshot) => {
            let stats = snapshot.stats();
            let response = RefreshResponse {
                status: "ok",
                message: format!(
                    "Refreshed {} projects, {} sessions",
                    snapshot.project_count(),
                    snapshot.session_count()
                ),
                sessions_scanned: Some(stats.sessions_scanned),
                sessions_cached: Some(stats.sessions_cached),
                duration: Some(stats.duration.as_secs_f64()),
            };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            tracing::warn!("Refresh failed: {}", e);
            let response = RefreshResponse {
                status: "error",
                message: e.to_string(),
                sessions_scanned: None,
                sessions_cached: None,
                duration: None,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response))
        }
    }
}
