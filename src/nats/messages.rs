use serde::{Deserialize, Serialize};

use crate::events::SessionEvent;

/// Lifecycle event as published to NATS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEventMessage {
    pub session_id: String,
    /// Per-publisher counter, starting at 0
    pub sequence: u64,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(flatten)]
    pub event: SessionEvent,
}

impl SessionEventMessage {
    pub fn new(session_id: &str, sequence: u64, event: SessionEvent) -> Self {
        Self {
            session_id: session_id.to_string(),
            sequence,
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
        }
    }
}

/// Subject carrying the lifecycle of one session
pub fn event_subject(session_id: &str) -> String {
    format!("recording.events.{}", session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::StopTrigger;

    #[test]
    fn test_event_fields_are_flattened() {
        let message = SessionEventMessage::new(
            "abc",
            3,
            SessionEvent::Stopping {
                trigger: StopTrigger::User,
            },
        );

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["session_id"], "abc");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json["kind"], "stopping");
        assert_eq!(json["trigger"], "user");

        let back: SessionEventMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back.event, message.event);
    }

    #[test]
    fn test_subject_is_per_session() {
        assert_eq!(event_subject("abc"), "recording.events.abc");
    }
}
