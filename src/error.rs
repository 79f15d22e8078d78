//! Error types for the recording pipeline
//!
//! One variant per failure kind the recorder can surface. Degraded audio
//! mixing has no variant: a missing audio source is logged and reported
//! through `MixReport`.

use thiserror::Error;

use crate::recording::RecordingState;

#[derive(Error, Debug)]
pub enum RecordingError {
    /// Camera or microphone denied or unavailable
    #[error("media acquisition failed: {0}")]
    Acquisition(String),

    /// Operation invoked from a state that does not allow it
    #[error("invalid state: {0}")]
    State(String),

    /// Capture encoder could not start
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Finalize called on a session that captured no bytes
    #[error("recording is empty: no segments were captured")]
    EmptyRecording,

    /// Persistence backend rejected or failed the upload
    #[error("upload failed: {0}")]
    Upload(String),

    /// Unrunnable mixer format, or use of a mix graph after it was disposed
    #[error("mix graph error: {0}")]
    MixGraph(String),

    /// Compositor could not be started with the requested surface
    #[error("compositor error: {0}")]
    Compositor(String),
}

impl RecordingError {
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub(crate) fn wrong_state(operation: &str, state: RecordingState) -> Self {
        Self::State(format!("{} is not allowed while {:?}", operation, state))
    }

    /// Stable code used by the control API and event payloads
    pub fn code(&self) -> &'static str {
        match self {
            Self::Acquisition(_) => "ACQUISITION_ERROR",
            Self::State(_) => "STATE_ERROR",
            Self::Encoding(_) => "ENCODING_ERROR",
            Self::EmptyRecording => "EMPTY_RECORDING",
            Self::Upload(_) => "UPLOAD_ERROR",
            Self::MixGraph(_) => "MIX_GRAPH_ERROR",
            Self::Compositor(_) => "COMPOSITOR_ERROR",
        }
    }

    /// Whether the caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upload(_))
    }
}

/// Result type alias using RecordingError
pub type RecordingResult<T> = Result<T, RecordingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            RecordingError::Acquisition("denied".into()),
            RecordingError::state("x"),
            RecordingError::Encoding("x".into()),
            RecordingError::EmptyRecording,
            RecordingError::Upload("x".into()),
            RecordingError::MixGraph("x".into()),
            RecordingError::Compositor("x".into()),
        ];

        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_upload_is_retryable() {
        assert!(RecordingError::Upload("timeout".into()).is_retryable());
        assert!(!RecordingError::EmptyRecording.is_retryable());
        assert!(!RecordingError::Encoding("unsupported".into()).is_retryable());
    }

    #[test]
    fn test_wrong_state_message_names_operation() {
        let err = RecordingError::wrong_state("start()", RecordingState::Idle);
        assert_eq!(err.to_string(), "invalid state: start() is not allowed while Idle");
    }
}
