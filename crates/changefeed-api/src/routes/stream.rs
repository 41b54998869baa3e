//! The change-stream endpoint.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION};
use axum::http::{HeaderMap, HeaderName};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{Router, routing::get};
use changefeed_plugin::application::change_stream::{
    StreamFrame, parse_cursor, parse_event_filter,
};
use changefeed_plugin::plugin::STREAM_PATH;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::auth::MaybeUser;
use crate::error::ApiError;
use crate::state::AppState;

const LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Query parameters of a stream connection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    /// Comma-separated event names to deliver; all events when absent.
    pub events: Option<String>,
    /// Resume after this event id. Takes precedence over `Last-Event-ID`.
    pub last_event_id: Option<String>,
}

fn to_sse_event(frame: StreamFrame) -> Event {
    match frame {
        StreamFrame::Connected => Event::default().comment("connected"),
        StreamFrame::Change(change) => {
            let id = change.id.to_string();
            Event::default()
                .id(id)
                .event("change")
                .json_data(&change)
                .unwrap_or_else(|e| {
                    error!(event_id = %change.id, error = %e, "failed to encode change event");
                    Event::default().comment("encoding failed")
                })
        }
    }
}

/// GET /api/_events/stream
#[instrument(
    skip_all,
    fields(connection_id = %Uuid::new_v4(), authenticated = user.is_authenticated())
)]
async fn stream_changes(
    State(state): State<AppState>,
    user: MaybeUser,
    headers: HeaderMap,
    Query(params): Query<StreamParams>,
) -> Result<impl IntoResponse, ApiError> {
    let header_cursor = headers.get(LAST_EVENT_ID).and_then(|v| v.to_str().ok());
    let cursor = parse_cursor(
        params
            .last_event_id
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .or(header_cursor),
    );
    let names = parse_event_filter(params.events.as_deref());
    info!(resume_after = ?cursor, filter = ?names, "change stream opened");

    let stream = state.plugin.change_stream(cursor, names).await.map_err(|e| {
        error!(error = %e, "failed to open change stream");
        ApiError(e)
    })?;
    let events = stream
        .into_frames(state.plugin.config().poll_interval())
        .take_until(state.shutdown_signal())
        .map(|frame| Ok::<_, Infallible>(to_sse_event(frame)));

    Ok((
        [
            (CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(events).keep_alive(KeepAlive::default()),
    ))
}

/// Returns the stream router.
pub fn router() -> Router<AppState> {
    Router::new().route(STREAM_PATH, get(stream_changes))
}
