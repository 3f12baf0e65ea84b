//! HTTP Server & Routing Integration Tests
//!
//! Exercise the router with `tower::ServiceExt::oneshot` against sessions
//! backed by scripted extractors.

mod helpers;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use follownet_common::ControlState;
use follownet_scrape::session::SessionRequest;
use follownet_scrape::{build_router, AppState};
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const ORIGIN: &str = "http://localhost:3000";

fn test_app_state(extractor: ScriptedExtractor) -> AppState {
    AppState::new(manager_with(extractor), vec![ORIGIN.to_string()])
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = tokio::time::timeout(PATIENCE, response.into_body().collect())
        .await
        .expect("body did not finish")
        .unwrap()
        .to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// JSON payloads of every `data:` line in an SSE body
fn sse_payloads(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| serde_json::from_str(data).ok())
        .collect()
}

fn payload_types(payloads: &[Value]) -> Vec<String> {
    payloads
        .iter()
        .filter(|p| p["type"] != "progress")
        .map(|p| p["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn health_reports_module_and_platforms() {
    // Given: a fresh service
    let app = build_router(test_app_state(ScriptedExtractor::records(&["a"])));

    // When: GET /health
    let response = app.oneshot(get("/health")).await.unwrap();

    // Then: module identity and extractor list
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "follownet-scrape");
    assert_eq!(json["active_sessions"], 0);
    assert_eq!(json["platforms"], json!(["github"]));
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn root_route_reports_running() {
    let app = build_router(test_app_state(ScriptedExtractor::records(&["a"])));

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["message"],
        "FollowNet API is running"
    );
}

#[tokio::test]
async fn stream_endpoint_serves_session_events() {
    // Given: three followers available
    let app = build_router(test_app_state(ScriptedExtractor::records(&[
        "alice", "bob", "carol",
    ])));

    // When: POST /api/scrape/stream
    let response = app
        .oneshot(post_json(
            "/api/scrape/stream",
            json!({ "url": "https://github.com/octocat", "max_users": 2 }),
        ))
        .await
        .unwrap();

    // Then: an SSE response tagged with the session id
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"), "{}", content_type);
    let session_id = response.headers()["x-session-id"]
        .to_str()
        .unwrap()
        .to_string();

    let body = body_text(response).await;
    assert!(body.contains("event: user_completed"));
    let payloads = sse_payloads(&body);
    assert_eq!(
        payload_types(&payloads),
        ["start", "platform", "user_completed", "user_completed", "complete"]
    );
    assert_eq!(payloads[0]["session_id"], session_id.as_str());
    assert_eq!(payloads[1]["platform"], "github");
    assert_eq!(payloads[2]["user_data"]["username"], "alice");

    let last = payloads.last().unwrap();
    assert_eq!(last["total"], 2);
    assert_eq!(last["data"].as_array().unwrap().len(), 2);
    assert_eq!(
        last["download_url"],
        format!("/api/export-csv/{}", session_id).as_str()
    );
}

#[tokio::test]
async fn finished_session_exports_csv() {
    // Given: a session that ran to completion
    let app = build_router(test_app_state(ScriptedExtractor::records(&["alice", "bob"])));
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/scrape/stream",
            json!({ "url": "https://github.com/octocat/followers" }),
        ))
        .await
        .unwrap();
    let session_id = response.headers()["x-session-id"]
        .to_str()
        .unwrap()
        .to_string();
    body_text(response).await;

    // When: GET /api/export-csv/:id
    let response = app
        .oneshot(get(&format!("/api/export-csv/{}", session_id)))
        .await
        .unwrap();

    // Then: a CSV attachment with one row per record
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(
        disposition.starts_with("attachment; filename=follownet_github_data_"),
        "{}",
        disposition
    );
    assert!(disposition.ends_with(".csv"));

    let csv = body_text(response).await;
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("username,display_name,bio"));
    assert_eq!(lines.count(), 2);
}

#[tokio::test]
async fn export_of_unknown_session_is_not_found() {
    let app = build_router(test_app_state(ScriptedExtractor::records(&["a"])));

    let response = app
        .oneshot(get(&format!("/api/export-csv/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unsupported_stream_request_yields_single_error_event() {
    let app = build_router(test_app_state(ScriptedExtractor::records(&["a"])));

    let response = app
        .oneshot(post_json(
            "/api/scrape/stream",
            json!({ "url": "https://example.com/people" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-session-id").is_none());
    let payloads = sse_payloads(&body_text(response).await);
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["type"], "error");
    assert_eq!(payloads[0]["kind"], "unsupported_platform");
}

#[tokio::test]
async fn scrape_endpoint_returns_summary() {
    let app = build_router(test_app_state(ScriptedExtractor::records(&["alice", "bob"])));

    let response = app
        .oneshot(post_json(
            "/api/scrape",
            json!({ "url": "https://github.com/octocat", "max_users": "unlimited", "page": 2 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["platform"], "github");
    assert_eq!(json["total_extracted"], 2);
    assert_eq!(json["current_page"], 2);
    assert_eq!(json["data"][1]["username"], "bob");
    assert!(json["download_url"]
        .as_str()
        .unwrap()
        .starts_with("/api/export-csv/"));
}

#[tokio::test]
async fn scrape_endpoint_with_no_results_is_not_successful() {
    let app = build_router(test_app_state(ScriptedExtractor::records(&[])));

    let response = app
        .oneshot(post_json(
            "/api/scrape",
            json!({ "url": "https://github.com/octocat" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "No data found");
    assert!(json.get("download_url").is_none());
}

#[tokio::test]
async fn scrape_endpoint_rejects_bad_requests() {
    let app = build_router(test_app_state(ScriptedExtractor::records(&["a"])));

    for body in [
        json!({ "url": "https://example.com/people" }),
        json!({ "url": "https://github.com/octocat", "max_users": 0 }),
        json!({ "url": "https://github.com/octocat", "page": -1 }),
    ] {
        let response = app
            .clone()
            .oneshot(post_json("/api/scrape", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn control_of_unknown_session_is_not_found() {
    let app = build_router(test_app_state(ScriptedExtractor::records(&["a"])));
    let id = uuid::Uuid::new_v4();

    for request in [
        post(&format!("/api/sessions/{}/pause", id)),
        post(&format!("/api/sessions/{}/resume", id)),
        post(&format!("/api/sessions/{}/stop", id)),
        get(&format!("/api/sessions/{}", id)),
    ] {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn malformed_session_id_is_bad_request() {
    let app = build_router(test_app_state(ScriptedExtractor::records(&["a"])));

    let response = app
        .oneshot(post("/api/sessions/not-a-uuid/pause"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn live_session_is_controlled_over_http() {
    // Given: a slow session started directly on the manager
    let state = test_app_state(ScriptedExtractor::numbered(100).with_delay(Duration::from_millis(20)));
    let app = build_router(state.clone());
    let mut stream = state
        .sessions
        .create(SessionRequest::new("https://github.com/octocat").with_limit(100))
        .await;
    let id = stream.session_id.unwrap();

    // Then: it is listed with its status
    let response = app.clone().oneshot(get("/api/sessions")).await.unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["session_id"], id.to_string().as_str());

    // When: paused over HTTP
    let response = app
        .clone()
        .oneshot(post(&format!("/api/sessions/{}/pause", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["accepted"], true);
    assert_eq!(json["state"], "paused");

    let response = app
        .clone()
        .oneshot(get(&format!("/api/sessions/{}", id)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["phase"], "paused");

    // And: pausing again is acknowledged without effect
    let response = app
        .clone()
        .oneshot(post(&format!("/api/sessions/{}/pause", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["accepted"], false);

    // When: stopped over HTTP
    let response = app
        .clone()
        .oneshot(post(&format!("/api/sessions/{}/stop", id)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["state"], "stopping");

    // Then: the event stream acknowledges both and ends stopped
    let events = collect(&mut stream.events).await;
    let acks: Vec<ControlState> = events
        .iter()
        .filter_map(|e| match e {
            follownet_common::ProgressEvent::ControlAcknowledged { state, .. } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(acks, [ControlState::Paused, ControlState::Stopping]);
    assert_eq!(types(&events).last(), Some(&"stopped"));

    wait_until_idle(&state.sessions).await;
    let response = app.oneshot(get("/api/sessions")).await.unwrap();
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let app = build_router(test_app_state(ScriptedExtractor::records(&["a"])));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/scrape/stream")
                .header(header::ORIGIN, ORIGIN)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        ORIGIN
    );
}
