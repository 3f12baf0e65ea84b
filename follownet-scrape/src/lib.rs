//! follownet-scrape library interface
//!
//! Exposes the session core, extractors and HTTP router for the binary and
//! for integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod extractor;
pub mod session;

pub use crate::error::{ApiError, ApiResult, SessionError};

use axum::http::HeaderValue;
use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::session::SessionManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions, extractors and retained snapshots
    pub sessions: SessionManager,
    /// Browser origins allowed by CORS
    pub allowed_origins: Vec<String>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(sessions: SessionManager, allowed_origins: Vec<String>) -> Self {
        Self {
            sessions,
            allowed_origins,
            startup_time: Utc::now(),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .merge(api::scrape_routes())
        .merge(api::session_routes())
        .merge(api::export_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
