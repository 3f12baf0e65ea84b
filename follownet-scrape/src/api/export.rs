//! CSV download endpoint

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::info;
use uuid::Uuid;

use crate::export::{file_name, to_csv};
use crate::{ApiResult, AppState};

/// GET /api/export-csv/:session_id
pub async fn export_csv(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Response> {
    let snapshot = state.sessions.snapshot(session_id).await?;
    let body = to_csv(&snapshot.records)?;
    let name = file_name(snapshot.platform.as_str(), &session_id);
    info!(
        session_id = %session_id,
        "Exporting {} records as {}",
        snapshot.records.len(),
        name
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", name),
            ),
        ],
        body,
    )
        .into_response())
}

/// Build export routes
pub fn export_routes() -> Router<AppState> {
    Router::new().route("/api/export-csv/:session_id", get(export_csv))
}
