use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logview_sessions::{DateRange, Session, SessionHierarchySnapshot, SessionMetadata};

use super::{engine_error, no_cache, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub project: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
}

/// A session as listed, with its derived hierarchy.
#[derive(Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub project_slug: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub parent_id: Option<String>,
    pub agent: Option<String>,
    pub children: Vec<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl SessionSummary {
    fn new(session: Session, snapshot: &SessionHierarchySnapshot) -> Self {
        Self {
            parent_id: session.parent_id().map(String::from),
            agent: session.agent().map(String::from),
            children: snapshot.children(&session.id).to_vec(),
            id: session.id,
            project_slug: session.project_slug,
            timestamp: session.timestamp,
            name: session.name,
            description: session.description,
        }
    }
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let project = params
        .project
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Missing project parameter".to_string()))?;
    let range = DateRange::parse(params.since.as_deref(), params.until.as_deref());

    let snapshot = state.scanner.fresh_snapshot().await.map_err(engine_error)?;
    let sessions = snapshot
        .sessions(project, &range)
        .unwrap_or_default()
        .into_iter()
        .map(|session| SessionSummary::new(session, &snapshot))
        .collect();

    Ok((no_cache(), Json(SessionsResponse { sessions })))
}

pub async fn get_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionMetadata>, ApiError> {
    let metadata = state
        .scanner
        .get_session_metadata(&id)
        .await
        .map_err(engine_error)?;

    Ok(Json(metadata))
}
