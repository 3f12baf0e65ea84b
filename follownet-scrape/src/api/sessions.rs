//! Session control and status endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use follownet_common::{ControlSignal, ControlState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionStatus;
use crate::{ApiResult, AppState};

/// Response to a pause/resume/stop request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub session_id: Uuid,
    /// `false` when the request was not valid in the current state
    pub accepted: bool,
    pub state: ControlState,
    pub message: String,
}

async fn apply(
    state: &AppState,
    session_id: Uuid,
    signal: ControlSignal,
) -> ApiResult<Json<ControlResponse>> {
    let outcome = state.sessions.control(session_id, signal).await?;
    let message = if outcome.accepted {
        format!("{} accepted", signal)
    } else {
        format!("{} ignored while {}", signal, outcome.state)
    };
    Ok(Json(ControlResponse {
        session_id,
        accepted: outcome.accepted,
        state: outcome.state,
        message,
    }))
}

/// POST /api/sessions/:session_id/pause
pub async fn pause_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ControlResponse>> {
    apply(&state, session_id, ControlSignal::Pause).await
}

/// POST /api/sessions/:session_id/resume
pub async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ControlResponse>> {
    apply(&state, session_id, ControlSignal::Resume).await
}

/// POST /api/sessions/:session_id/stop
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ControlResponse>> {
    apply(&state, session_id, ControlSignal::Stop).await
}

/// GET /api/sessions/:session_id
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionStatus>> {
    Ok(Json(state.sessions.status(session_id).await?))
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionStatus>> {
    Json(state.sessions.list().await)
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:session_id", get(session_status))
        .route("/api/sessions/:session_id/pause", post(pause_session))
        .route("/api/sessions/:session_id/resume", post(resume_session))
        .route("/api/sessions/:session_id/stop", post(stop_session))
}
