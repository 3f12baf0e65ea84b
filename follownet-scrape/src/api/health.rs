//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use follownet_common::Platform;
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status ("ok" or "shutting_down")
    pub status: String,
    /// Module name ("follownet-scrape")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Git commit and build profile
    pub build: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Sessions currently registered
    pub active_sessions: usize,
    /// Finished sessions whose results can still be exported
    pub retained_snapshots: usize,
    /// Platforms with an extractor
    pub platforms: Vec<Platform>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let status = if state.sessions.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "follownet-scrape".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: format!("{} ({})", env!("GIT_HASH"), env!("BUILD_PROFILE")),
        uptime_seconds,
        active_sessions: state.sessions.active_count().await,
        retained_snapshots: state.sessions.retained_snapshots().await,
        platforms: state.sessions.platforms(),
    })
}

/// GET /
pub async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "FollowNet API is running" }))
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
}
