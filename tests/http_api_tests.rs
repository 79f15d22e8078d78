// HTTP API tests driven through the router without binding a socket

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use session_recorder::storage::FilesystemBackend;
use session_recorder::video::CompositorConfig;
use session_recorder::{create_router, AppState, ControllerConfig, SyntheticPattern};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn app(dir: &TempDir) -> Router {
    let recorder = ControllerConfig {
        compositor: CompositorConfig {
            width: 32,
            height: 18,
            refresh_hz: 30,
        },
        ..ControllerConfig::default()
    };
    let backend = Arc::new(FilesystemBackend::new(dir.path()));
    let state = AppState::new(recorder, backend).with_patterns(
        SyntheticPattern::default().with_size(16, 9),
        SyntheticPattern::peer().with_size(16, 9),
    );
    create_router(state)
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn create(app: &Router) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/sessions")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"owner_id":"therapist-7","label":"follow-up"}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["state"], "armed");
    assert_eq!(json["owner_id"], "therapist-7");
    json["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test(start_paused = true)]
async fn test_create_without_body_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, json) = call(&app, "POST", "/sessions").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["owner_id"], "anonymous");
    assert_eq!(json["state"], "armed");
}

#[tokio::test(start_paused = true)]
async fn test_record_stop_and_save_over_http() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let id = create(&app).await;

    let (status, json) = call(&app, "POST", &format!("/sessions/{}/start", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "recording");

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let (status, json) = call(&app, "GET", &format!("/sessions/{}/status", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["elapsed_seconds"], 2);

    let (status, json) = call(&app, "POST", &format!("/sessions/{}/stop", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "stopped");
    assert_eq!(json["status"]["state"], "stopped");
    assert_eq!(json["status"]["last_stop"], "user");

    let (status, json) = call(&app, "POST", &format!("/sessions/{}/save", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"]["state"], "persisted");
    assert_eq!(json["status"]["artifact"]["ownerId"], "therapist-7");
    let url = json["url"].as_str().unwrap();
    assert!(url.starts_with("file://"));

    let filename = json["status"]["artifact"]["filename"].as_str().unwrap();
    assert!(dir.path().join(filename).exists());
}

#[tokio::test(start_paused = true)]
async fn test_second_stop_reports_already_stopped() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let id = create(&app).await;

    call(&app, "POST", &format!("/sessions/{}/start", id)).await;
    tokio::time::sleep(Duration::from_millis(1200)).await;
    call(&app, "POST", &format!("/sessions/{}/stop", id)).await;

    let (status, json) = call(&app, "POST", &format!("/sessions/{}/stop", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "already_stopped");
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_conflicts() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let id = create(&app).await;

    let (status, _) = call(&app, "POST", &format!("/sessions/{}/start", id)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&app, "POST", &format!("/sessions/{}/start", id)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "STATE_ERROR");
}

#[tokio::test(start_paused = true)]
async fn test_save_before_recording_conflicts() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let id = create(&app).await;

    let (status, json) = call(&app, "POST", &format!("/sessions/{}/save", id)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "STATE_ERROR");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_session_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let id = uuid::Uuid::new_v4();

    let (status, json) = call(&app, "GET", &format!("/sessions/{}/status", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    let (status, _) = call(&app, "DELETE", &format!("/sessions/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_toggles_report_mute_state() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let id = create(&app).await;

    let (_, json) = call(&app, "POST", &format!("/sessions/{}/audio/toggle", id)).await;
    assert_eq!(json["muted"], true);
    let (_, json) = call(&app, "POST", &format!("/sessions/{}/audio/toggle", id)).await;
    assert_eq!(json["muted"], false);
    let (_, json) = call(&app, "POST", &format!("/sessions/{}/video/toggle", id)).await;
    assert_eq!(json["muted"], true);
}

#[tokio::test(start_paused = true)]
async fn test_peer_disconnect_stops_recording() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let id = create(&app).await;

    call(&app, "POST", &format!("/sessions/{}/start", id)).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let (status, _) = call(&app, "POST", &format!("/sessions/{}/peer/disconnect", id)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (_, json) = call(&app, "GET", &format!("/sessions/{}/status", id)).await;
    assert_eq!(json["state"], "stopped");
    assert_eq!(json["last_stop"], "peer_disconnected");
}

#[tokio::test(start_paused = true)]
async fn test_delete_keeps_unsaved_recording_available_for_save() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let id = create(&app).await;

    call(&app, "POST", &format!("/sessions/{}/start", id)).await;
    tokio::time::sleep(Duration::from_millis(2200)).await;

    let (status, json) = call(&app, "DELETE", &format!("/sessions/{}", id)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "STATE_ERROR");

    let (status, json) = call(&app, "GET", &format!("/sessions/{}/status", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "stopped");
    assert_eq!(json["last_stop"], "view_teardown");
    assert_eq!(json["resources"]["capture_engines"], 0);
    assert_eq!(json["resources"]["mix_graphs"], 0);

    let (status, json) = call(&app, "POST", &format!("/sessions/{}/save", id)).await;
    assert_eq!(status, StatusCode::OK);
    let filename = json["status"]["artifact"]["filename"].as_str().unwrap();
    assert!(dir.path().join(filename).exists());

    let (status, json) = call(&app, "DELETE", &format!("/sessions/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "already_stopped");

    let (status, _) = call(&app, "GET", &format!("/sessions/{}/status", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_delete_with_discard_forgets_unsaved_recording() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let id = create(&app).await;

    call(&app, "POST", &format!("/sessions/{}/start", id)).await;
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let (status, json) = call(&app, "DELETE", &format!("/sessions/{}?discard=true", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "stopped");
    assert_eq!(json["status"]["last_stop"], "view_teardown");

    let (status, _) = call(&app, "GET", &format!("/sessions/{}/status", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delete_armed_session_without_recording() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let id = create(&app).await;

    let (status, json) = call(&app, "DELETE", &format!("/sessions/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "already_stopped");

    let (status, _) = call(&app, "GET", &format!("/sessions/{}/status", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
