//! Server-Sent Events for run progress
//!
//! Each subscriber only sees events for its own runs.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use tracing::info;

use mintel_common::sse::filtered_event_stream;

use super::auth::AuthUser;
use crate::AppState;

/// GET /api/events
///
/// Streams RunQueued, RunStarted, StageCompleted, RunCompleted and RunFailed for the
/// caller's runs, with a heartbeat every 15 seconds.
pub async fn run_event_stream(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user_id = %user_id, "New SSE client connected to run events");

    let rx = state.event_bus.subscribe();
    filtered_event_stream(rx, move |event| event.user_id() == user_id)
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/api/events", get(run_event_stream))
}
