use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};

use logview_sessions::{list_headers, read_record, EventHeader, EventRecord};

use super::{blocking, engine_error, no_cache, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub session: String,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<EventHeader>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .scanner
        .get_session(&params.session)
        .await
        .map_err(engine_error)?;

    let path = session.events_path();
    let events = blocking(move || list_headers(&path)).await?;

    Ok((no_cache(), Json(EventsResponse { events })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordParams {
    /// A header's `offset`, letting the read seek instead of scan.
    pub byte_offset: Option<u64>,
}

pub async fn get_event(
    State(state): State<AppState>,
    Path((session_id, line)): Path<(String, u64)>,
    Query(params): Query<RecordParams>,
) -> Result<Json<EventRecord>, ApiError> {
    let session = state
        .scanner
        .get_session(&session_id)
        .await
        .map_err(engine_error)?;

    let path = session.events_path();
    let record = blocking(move || read_record(&path, line, params.byte_offset)).await?;

    Ok(Json(record))
}
