use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::state::{AppState, SessionEntry};
use crate::error::RecordingError;
use crate::media::{LocalMediaAcquirer, SyntheticDevices};
use crate::nats::NatsClient;
use crate::recording::{RecordingController, SessionContext, SessionStatus, StopOutcome, StopTrigger};
use crate::transport::{LoopbackTransport, RealtimeMediaTransport};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Account the recording belongs to
    pub owner_id: Option<String>,

    /// Label stored with the artifact
    pub label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloseSessionParams {
    /// Drop captured data that was never persisted
    pub discard: bool,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub outcome: StopOutcome,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub url: String,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct MuteResponse {
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Handler failure rendered as a JSON error body
pub enum ApiError {
    NotFound(Uuid),
    Recording(RecordingError),
}

impl From<RecordingError> for ApiError {
    fn from(e: RecordingError) -> Self {
        Self::Recording(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Session {} not found", id),
            ),
            Self::Recording(e) => {
                let status = match &e {
                    RecordingError::State(_) => StatusCode::CONFLICT,
                    RecordingError::EmptyRecording => StatusCode::UNPROCESSABLE_ENTITY,
                    RecordingError::Acquisition(_) => StatusCode::SERVICE_UNAVAILABLE,
                    RecordingError::Upload(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code(), e.to_string())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn lookup(state: &AppState, session_id: Uuid) -> ApiResult<Arc<SessionEntry>> {
    state
        .session(&session_id)
        .await
        .ok_or(ApiError::NotFound(session_id))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Connect local media and the peer, then arm a recorder for them
pub async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> ApiResult<(StatusCode, Json<SessionStatus>)> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let context = SessionContext::new(
        req.owner_id.unwrap_or_else(|| "anonymous".to_string()),
        req.label.unwrap_or_default(),
    );
    let session_id = context.session_id;

    info!("Creating session {}", session_id);

    let acquirer = LocalMediaAcquirer::new(Box::new(SyntheticDevices::new(state.local_pattern.clone())));
    let transport = LoopbackTransport::connect(acquirer, state.peer_pattern.clone()).await?;

    let controller = RecordingController::new(context, state.recorder.clone());
    controller
        .arm(transport.local_stream().as_ref(), transport.remote_stream().as_ref())
        .await?;

    if let Some(url) = &state.nats_url {
        match NatsClient::connect(url, session_id.to_string()).await {
            Ok(client) => {
                let _ = Arc::new(client).forward_events(controller.subscribe());
            }
            Err(e) => warn!("Session events will not be published: {:#}", e),
        }
    }

    let status = controller.status().await;
    state.sessions.write().await.insert(
        session_id,
        Arc::new(SessionEntry {
            controller,
            transport: Mutex::new(transport),
        }),
    );

    Ok((StatusCode::CREATED, Json(status)))
}

/// POST /sessions/:session_id/start
pub async fn start_recording(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionStatus>> {
    let entry = lookup(&state, session_id).await?;
    entry.controller.start().await?;
    Ok(Json(entry.controller.status().await))
}

/// POST /sessions/:session_id/stop
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<StopResponse>> {
    let entry = lookup(&state, session_id).await?;
    let outcome = entry.controller.stop(StopTrigger::User).await;
    Ok(Json(StopResponse {
        outcome,
        status: entry.controller.status().await,
    }))
}

/// POST /sessions/:session_id/save
/// Finalize (first time only) and persist; call again after a failed upload
pub async fn save_recording(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SaveResponse>> {
    let entry = lookup(&state, session_id).await?;

    let stored = entry
        .controller
        .save(state.backend.as_ref())
        .await
        .map_err(|e| {
            error!("Failed to save session {}: {}", session_id, e);
            e
        })?;

    Ok(Json(SaveResponse {
        url: stored.url,
        status: entry.controller.status().await,
    }))
}

/// GET /sessions/:session_id/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionStatus>> {
    let entry = lookup(&state, session_id).await?;
    Ok(Json(entry.controller.status().await))
}

/// POST /sessions/:session_id/audio/toggle
pub async fn toggle_audio(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<MuteResponse>> {
    let entry = lookup(&state, session_id).await?;
    let muted = entry.transport.lock().await.toggle_audio();
    Ok(Json(MuteResponse { muted }))
}

/// POST /sessions/:session_id/video/toggle
pub async fn toggle_video(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<MuteResponse>> {
    let entry = lookup(&state, session_id).await?;
    let muted = entry.transport.lock().await.toggle_video();
    Ok(Json(MuteResponse { muted }))
}

/// POST /sessions/:session_id/peer/disconnect
/// The recorder stops itself once it observes the remote stream ending
pub async fn disconnect_peer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let entry = lookup(&state, session_id).await?;
    entry.transport.lock().await.disconnect_peer();
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /sessions/:session_id
/// Hang up: stop any recording and release media, then forget the session.
/// Captured data that was never persisted keeps the session registered
/// (409) so it can still be saved, unless `?discard=true` is passed.
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<CloseSessionParams>,
) -> ApiResult<Json<StopResponse>> {
    let entry = lookup(&state, session_id).await?;

    let outcome = entry.transport.lock().await.hang_up(&entry.controller).await;
    let status = entry.controller.status().await;

    let unsaved = status.segment_count > 0 && status.url.is_none();
    if unsaved && !params.discard {
        warn!(
            "Session {} holds an unsaved recording ({} segments); keeping it",
            session_id, status.segment_count
        );
        return Err(RecordingError::state(
            "recording has not been persisted; save it or close with ?discard=true",
        )
        .into());
    }
    if unsaved {
        warn!("Discarding unsaved recording of session {}", session_id);
    }

    state.sessions.write().await.remove(&session_id);
    info!("Session {} closed", session_id);

    Ok(Json(StopResponse { outcome, status }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
