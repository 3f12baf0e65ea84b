//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE helpers for FollowNet services.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::events::ProgressEvent;

/// Keep-alive interval for every SSE response
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert a progress event into an SSE frame
///
/// The SSE `event:` name is the wire tag and `data:` is the JSON object, so
/// clients can either dispatch on the SSE event name or on `data.type`.
pub fn to_sse_event(event: &ProgressEvent) -> Option<Event> {
    match event.to_json() {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e);
            None
        }
    }
}

/// Standard keep-alive used by every stream
pub fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat")
}

/// Create a simple heartbeat-only SSE stream for connection status monitoring
///
/// # Arguments
/// * `service_name` - Name of the service for logging (e.g., "follownet-scrape")
pub fn create_heartbeat_sse_stream(
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} general events", service_name);

    let stream = async_stream::stream! {
        info!("SSE: {} event stream started", service_name);

        // Send initial connected status
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            debug!("SSE: Sending heartbeat");
            yield Ok(Event::default().comment("heartbeat"));
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}
