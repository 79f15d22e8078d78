use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Armed,
    Recording,
    Stopping,
    Stopped,
    Uploading,
    Persisted,
    UploadFailed,
}

impl RecordingState {
    /// States from which the controller can go back to `Idle`
    pub fn can_reset(self) -> bool {
        matches!(self, Self::Armed | Self::Stopped | Self::Persisted)
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Uploading => "uploading",
            Self::Persisted => "persisted",
            Self::UploadFailed => "upload_failed",
        };
        f.write_str(name)
    }
}

/// What asked for the recording to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopTrigger {
    /// Explicit stop from the user
    User,
    /// The owning view or service is going away
    ViewTeardown,
    /// The remote stream ended
    PeerDisconnected,
    /// An internal failure forced the stop
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// This call ran the teardown
    Stopped,
    /// Nothing was recording, or another caller already tore down
    AlreadyStopped,
}

/// Identity of a session, passed in by whoever creates the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: Uuid,
    /// Account the recording belongs to
    pub owner_id: String,
    /// Free-form label stored with the artifact
    pub label: String,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(owner_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            label: label.into(),
            created_at: Utc::now(),
        }
    }
}
