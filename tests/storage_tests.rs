// Persistence backend tests: filesystem into a temp dir, HTTP against a
// local upload endpoint

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use parking_lot::Mutex;
use session_recorder::storage::{FilesystemBackend, HttpUploadBackend};
use session_recorder::{ArtifactMetadata, PersistenceBackend};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn metadata(filename: &str, byte_size: u64) -> ArtifactMetadata {
    ArtifactMetadata {
        duration_seconds: 65,
        byte_size,
        created_at: Utc::now(),
        owner_id: "therapist-1".to_string(),
        label: "intake".to_string(),
        filename: filename.to_string(),
        mime_type: "video/x-srec".to_string(),
    }
}

#[tokio::test]
async fn test_filesystem_backend_writes_artifact_and_sidecar() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("recordings");
    let backend = FilesystemBackend::new(&root);
    let bytes = b"SREC\x01payload".to_vec();

    let stored = backend
        .persist(&bytes, &metadata("session-1.srec", bytes.len() as u64))
        .await
        .unwrap();

    assert!(stored.url.starts_with("file://"));
    assert!(stored.url.ends_with("session-1.srec"));
    assert_eq!(std::fs::read(root.join("session-1.srec")).unwrap(), bytes);

    let sidecar = std::fs::read_to_string(root.join("session-1.srec.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&sidecar).unwrap();
    assert_eq!(json["ownerId"], "therapist-1");
    assert_eq!(json["durationSeconds"], 65);
}

#[tokio::test]
async fn test_filesystem_backend_rejects_path_in_filename() {
    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path());

    let result = backend.persist(b"x", &metadata("../escape.srec", 1)).await;

    assert!(result.is_err());
    assert!(!dir.path().join("../escape.srec").exists());
}

#[derive(Clone, Default)]
struct Uploads {
    seen: Arc<Mutex<Vec<(HashMap<String, String>, Option<String>, Vec<u8>)>>>,
}

async fn accept_upload(
    State(uploads): State<Uploads>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<serde_json::Value> {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = query.get("filename").cloned().unwrap_or_default();
    uploads.seen.lock().push((query, content_type, body.to_vec()));
    Json(serde_json::json!({ "url": format!("https://cdn.test/{}", filename) }))
}

async fn reject_upload() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "storage offline")
}

async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}/api/recordings", addr)
}

#[tokio::test]
async fn test_http_backend_posts_body_with_query_metadata() {
    let uploads = Uploads::default();
    let app = Router::new()
        .route("/api/recordings", post(accept_upload))
        .with_state(uploads.clone());
    let url = spawn_server(app).await;
    let backend = HttpUploadBackend::new(&url, Duration::from_secs(5)).unwrap();
    let bytes = vec![7u8; 2048];

    let stored = backend
        .persist(&bytes, &metadata("session-42.srec", bytes.len() as u64))
        .await
        .unwrap();

    assert_eq!(stored.url, "https://cdn.test/session-42.srec");

    let seen = uploads.seen.lock();
    assert_eq!(seen.len(), 1);
    let (query, content_type, body) = &seen[0];
    assert_eq!(query["filename"], "session-42.srec");
    assert_eq!(query["ownerId"], "therapist-1");
    assert_eq!(query["duration"], "01:05");
    assert_eq!(query["size"], "0.0 MB");
    assert_eq!(query["label"], "intake");
    assert_eq!(content_type.as_deref(), Some("video/x-srec"));
    assert_eq!(body, &bytes);
}

#[tokio::test]
async fn test_http_backend_fails_on_error_status() {
    let app = Router::new().route("/api/recordings", post(reject_upload));
    let url = spawn_server(app).await;
    let backend = HttpUploadBackend::new(&url, Duration::from_secs(5)).unwrap();

    let err = backend
        .persist(b"data", &metadata("session-1.srec", 4))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_http_backend_fails_when_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let backend =
        HttpUploadBackend::new(&format!("http://{}/api/recordings", addr), Duration::from_secs(2))
            .unwrap();

    assert!(backend.persist(b"data", &metadata("session-1.srec", 4)).await.is_err());
}
