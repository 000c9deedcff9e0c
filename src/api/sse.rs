//! Server-Sent Events support

use crate::stream::UiEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Relay a session's change notifications as SSE
pub fn sse_stream(
    chat_id: String,
    events: broadcast::Receiver<UiEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(events).filter_map(move |result| match result {
        Ok(event) => Some(Ok(to_axum_event(&event))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            // Later snapshots carry full values, so the client catches up
            tracing::debug!(chat_id = %chat_id, skipped, "SSE subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn to_axum_event(event: &UiEvent) -> Event {
    let name = match event {
        UiEvent::Snapshot { .. } => "snapshot",
        UiEvent::Delta { .. } => "delta",
    };
    let data = serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode UI event");
        String::from("{}")
    });
    Event::default().event(name).data(data)
}
