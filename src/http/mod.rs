//! HTTP control API for recording sessions
//!
//! - POST /sessions - Create a session and arm it
//! - POST /sessions/:id/start - Start recording
//! - POST /sessions/:id/stop - Stop recording
//! - POST /sessions/:id/save - Finalize and persist (retry-safe)
//! - GET /sessions/:id/status - Query session status
//! - POST /sessions/:id/{audio,video}/toggle - Mute controls
//! - POST /sessions/:id/peer/disconnect - Drop the remote peer
//! - DELETE /sessions/:id - Hang up and forget the session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, SessionEntry};
