use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::{event_subject, SessionEventMessage};
use crate::events::{event_stream, SessionEvent};

pub struct NatsClient {
    client: Client,
    session_id: String,
    sequence: AtomicU64,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            session_id,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn subject(&self) -> String {
        event_subject(&self.session_id)
    }

    /// Publish one lifecycle event
    pub async fn publish_event(&self, event: SessionEvent) -> Result<()> {
        let subject = self.subject();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let kind = event.kind();
        let message = SessionEventMessage::new(&self.session_id, sequence, event);

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish session event")?;

        debug!("Published {} event to {} (seq={})", kind, subject, sequence);

        Ok(())
    }

    /// Forward every event from `events` until the channel closes
    pub fn forward_events(
        self: Arc<Self>,
        events: broadcast::Receiver<SessionEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Forwarding session events to {}", self.subject());

            let mut events = Box::pin(event_stream(events));
            while let Some(event) = events.next().await {
                if let Err(e) = self.publish_event(event).await {
                    error!("Failed to publish session event: {:#}", e);
                }
            }

            if let Err(e) = self.client.flush().await {
                warn!("Failed to flush NATS connection: {}", e);
            }
            info!("Session event forwarding stopped");
        })
    }
}
