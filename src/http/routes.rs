use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/:session_id", delete(handlers::close_session))
        .route("/sessions/:session_id/start", post(handlers::start_recording))
        .route("/sessions/:session_id/stop", post(handlers::stop_recording))
        .route("/sessions/:session_id/save", post(handlers::save_recording))
        .route("/sessions/:session_id/status", get(handlers::get_session_status))
        // Live controls
        .route("/sessions/:session_id/audio/toggle", post(handlers::toggle_audio))
        .route("/sessions/:session_id/video/toggle", post(handlers::toggle_video))
        .route(
            "/sessions/:session_id/peer/disconnect",
            post(handlers::disconnect_peer),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
