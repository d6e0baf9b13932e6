use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};

use logview_sessions::{DateRange, Project};

use super::{engine_error, no_cache, ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub since: Option<String>,
    pub until: Option<String>,
}

impl RangeParams {
    pub fn range(&self) -> DateRange {
        DateRange::parse(self.since.as_deref(), self.until.as_deref())
    }
}

#[derive(Serialize)]
pub struct ProjectsResponse {
    pub projects: Vec<Project>,
    pub is_scanning: bool,
}

pub async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.scanner.fresh_snapshot().await.map_err(engine_error)?;

    let response = ProjectsResponse {
        projects: snapshot.projects(&params.range()),
        is_scanning: state.scanner.is_scanning(),
    };

    Ok((no_cache(), Json(response)))
}
