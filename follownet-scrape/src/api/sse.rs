//! Server-Sent Events streams

use std::convert::Infallible;

use axum::response::sse::{Event, Sse};
use follownet_common::sse::{create_heartbeat_sse_stream, keep_alive, to_sse_event};
use follownet_common::ProgressEvent;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Forward one session's events until its terminal event
///
/// Dropping the returned stream (client disconnect) drops the receiver,
/// which the session observes as a stop request.
pub fn session_event_stream(
    session_id: Option<Uuid>,
    mut events: mpsc::Receiver<ProgressEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        while let Some(event) = events.recv().await {
            let terminal = event.is_terminal();
            if let Some(frame) = to_sse_event(&event) {
                yield Ok(frame);
            }
            if terminal {
                break;
            }
        }
        match session_id {
            Some(id) => debug!("SSE: session {} stream closed", id),
            None => debug!("SSE: rejected session stream closed"),
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}

/// GET /events - heartbeat stream for connection status
pub async fn event_stream() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    create_heartbeat_sse_stream("follownet-scrape")
}
