use std::path::PathBuf;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio_stream::{Stream, StreamExt};

use logview_sessions::TailDispatcher;

use super::{blocking, engine_error, ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// Last line the client already holds; defaults to the current end of
    /// the file.
    pub after: Option<u64>,
    /// Opening a new stream for the same viewer closes its previous one.
    pub viewer: Option<String>,
}

pub async fn stream_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let session = state
        .scanner
        .get_session(&session_id)
        .await
        .map_err(engine_error)?;

    let path: PathBuf = session.events_path();
    let dispatcher = match params.after {
        Some(after) => TailDispatcher::new(session_id, path, after),
        None => blocking(move || TailDispatcher::from_current(session_id, path)).await?,
    };
    tracing::debug!(
        "Opening live stream for {} after line {}",
        dispatcher.session_id(),
        dispatcher.watermark()
    );

    let subscription = dispatcher.subscribe(state.poll_interval);
    if let Some(viewer) = params.viewer.as_deref() {
        state.registry.register(viewer, &subscription);
    }

    let stream = subscription.map(|batch| Event::default().event("new_events").json_data(batch));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
