//! Session lifecycle events
//!
//! Every state transition of a `RecordingController` is broadcast as one of
//! these. Each kind carries only the fields that describe it.

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::audio::MixReport;
use crate::recording::StopTrigger;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    Armed,
    Started {
        mix: MixReport,
    },
    StartFailed {
        code: String,
        error: String,
    },
    Stopping {
        trigger: StopTrigger,
    },
    Stopped {
        trigger: StopTrigger,
        elapsed_seconds: u64,
        segment_count: usize,
        byte_size: usize,
    },
    Finalized {
        filename: String,
        byte_size: u64,
        duration_seconds: u64,
    },
    Uploading {
        attempt: u32,
    },
    Persisted {
        url: String,
    },
    UploadFailed {
        attempt: u32,
        error: String,
    },
    Reset,
}

impl SessionEvent {
    /// The `kind` tag as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Armed => "armed",
            Self::Started { .. } => "started",
            Self::StartFailed { .. } => "start_failed",
            Self::Stopping { .. } => "stopping",
            Self::Stopped { .. } => "stopped",
            Self::Finalized { .. } => "finalized",
            Self::Uploading { .. } => "uploading",
            Self::Persisted { .. } => "persisted",
            Self::UploadFailed { .. } => "upload_failed",
            Self::Reset => "reset",
        }
    }
}

/// Adapt a subscription into a stream that ends when the controller is dropped.
/// Events missed by a slow reader are skipped with a warning.
pub fn event_stream(rx: broadcast::Receiver<SessionEvent>) -> impl Stream<Item = SessionEvent> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_events_are_tagged_by_kind() {
        let event = SessionEvent::Stopped {
            trigger: StopTrigger::PeerDisconnected,
            elapsed_seconds: 12,
            segment_count: 12,
            byte_size: 4096,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "stopped");
        assert_eq!(json["trigger"], "peer_disconnected");
        assert_eq!(json["elapsed_seconds"], 12);
        assert_eq!(event.kind(), "stopped");

        let back: SessionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_unit_variants_carry_only_kind() {
        let json = serde_json::to_string(&SessionEvent::Armed).unwrap();
        assert_eq!(json, r#"{"kind":"armed"}"#);
    }

    #[tokio::test]
    async fn test_event_stream_ends_with_sender() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(SessionEvent::Armed).unwrap();
        tx.send(SessionEvent::Reset).unwrap();
        drop(tx);

        let events: Vec<SessionEvent> = event_stream(rx).collect().await;
        assert_eq!(events, vec![SessionEvent::Armed, SessionEvent::Reset]);
    }
}
