//! Scrape endpoints
//!
//! `POST /api/scrape/stream` answers with the session's SSE stream.
//! `POST /api/scrape` drives a session to its end and answers with a JSON
//! summary.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use follownet_common::{ErrorKind, Platform, ProgressEvent, Record};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::sse::session_event_stream;
use crate::session::{LimitParam, SessionRequest, SessionStream};
use crate::{ApiError, ApiResult, AppState};

/// Response header carrying the new session's id
pub const SESSION_ID_HEADER: HeaderName = HeaderName::from_static("x-session-id");

/// Request body shared by both scrape endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapeRequest {
    pub url: String,
    /// 1-based starting page
    #[serde(default)]
    pub page: Option<i64>,
    /// Positive integer or "unlimited"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_users: Option<LimitParam>,
}

impl From<ScrapeRequest> for SessionRequest {
    fn from(request: ScrapeRequest) -> Self {
        SessionRequest {
            url: request.url,
            page: request.page,
            limit: request.max_users,
        }
    }
}

/// Summary returned by `POST /api/scrape`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub total_extracted: usize,
    pub data: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub current_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}

/// POST /api/scrape/stream
pub async fn scrape_stream(
    State(state): State<AppState>,
    Json(request): Json<ScrapeRequest>,
) -> Response {
    let SessionStream { session_id, events } = state.sessions.create(request.into()).await;

    let mut headers = HeaderMap::new();
    if let Some(id) = session_id {
        if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
            headers.insert(SESSION_ID_HEADER, value);
        }
    }
    (headers, session_event_stream(session_id, events)).into_response()
}

/// POST /api/scrape
pub async fn scrape(
    State(state): State<AppState>,
    Json(request): Json<ScrapeRequest>,
) -> ApiResult<Json<ScrapeResponse>> {
    let current_page = request
        .page
        .and_then(|p| u32::try_from(p).ok())
        .unwrap_or(1)
        .max(1);
    let SessionStream {
        session_id,
        mut events,
    } = state.sessions.create(request.into()).await;

    let mut platform = None;
    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::PlatformResolved { platform: p, .. } => platform = Some(p),
            ProgressEvent::Completed {
                data,
                total,
                message,
                download_url,
            } => {
                let success = total > 0;
                return Ok(Json(ScrapeResponse {
                    success,
                    message: if success {
                        message
                    } else {
                        "No data found".to_string()
                    },
                    platform,
                    total_extracted: total,
                    data,
                    download_url,
                    current_page,
                    session_id,
                }));
            }
            ProgressEvent::Stopped {
                message,
                total,
                download_url,
            } => {
                let data = match session_id {
                    Some(id) => state
                        .sessions
                        .snapshot(id)
                        .await
                        .map(|s| s.records.to_vec())
                        .unwrap_or_default(),
                    None => Vec::new(),
                };
                return Ok(Json(ScrapeResponse {
                    success: total > 0,
                    message,
                    platform,
                    total_extracted: total,
                    data,
                    download_url,
                    current_page,
                    session_id,
                }));
            }
            ProgressEvent::Failed { kind, message } => {
                return Err(match kind {
                    ErrorKind::Validation | ErrorKind::UnsupportedPlatform => {
                        ApiError::BadRequest(message)
                    }
                    ErrorKind::FatalExtraction | ErrorKind::ShutdownTimeout | ErrorKind::Internal => {
                        ApiError::Internal(message)
                    }
                });
            }
            other => debug!("scrape: {}", other.event_type()),
        }
    }

    Err(ApiError::Internal(
        "Session ended without a terminal event".to_string(),
    ))
}

/// Build scrape routes
pub fn scrape_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scrape", post(scrape))
        .route("/api/scrape/stream", post(scrape_stream))
}
