//! Server-Sent Events (SSE) utilities

use crate::events::IntelEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Heartbeat interval for all SSE streams
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert an event into an SSE frame named after the event type
pub fn to_sse_event(event: &IntelEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e);
            None
        }
    }
}

/// Stream the events accepted by `filter` from a broadcast receiver
///
/// Lagged receivers skip the dropped events and continue; the stream ends when the
/// bus is closed.
pub fn filtered_event_stream<F>(
    mut rx: broadcast::Receiver<IntelEvent>,
    filter: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: Fn(&IntelEvent) -> bool + Send + 'static,
{
    let stream = async_stream::stream! {
        info!("SSE: event stream started");
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !filter(&event) {
                        continue;
                    }
                    if let Some(frame) = to_sse_event(&event) {
                        debug!("SSE: Broadcasting {}", event.event_type());
                        yield Ok(frame);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
