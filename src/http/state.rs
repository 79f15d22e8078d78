use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::media::SyntheticPattern;
use crate::recording::{ControllerConfig, RecordingController};
use crate::storage::PersistenceBackend;
use crate::transport::LoopbackTransport;

/// One live session: its controller and the transport feeding it
pub struct SessionEntry {
    pub controller: RecordingController,
    pub transport: Mutex<LoopbackTransport>,
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions (session_id → entry)
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionEntry>>>>,
    /// Pipeline settings for new sessions
    pub recorder: ControllerConfig,
    pub backend: Arc<dyn PersistenceBackend>,
    /// Pattern served as the local camera/microphone
    pub local_pattern: SyntheticPattern,
    /// Pattern served as the remote peer
    pub peer_pattern: SyntheticPattern,
    /// Lifecycle events are forwarded here when set
    pub nats_url: Option<String>,
}

impl AppState {
    pub fn new(recorder: ControllerConfig, backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            recorder,
            backend,
            local_pattern: SyntheticPattern::default(),
            peer_pattern: SyntheticPattern::peer(),
            nats_url: None,
        }
    }

    pub fn with_nats(mut self, url: Option<String>) -> Self {
        self.nats_url = url;
        self
    }

    pub fn with_patterns(mut self, local: SyntheticPattern, peer: SyntheticPattern) -> Self {
        self.local_pattern = local;
        self.peer_pattern = peer;
        self
    }

    pub async fn session(&self, id: &Uuid) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(id).cloned()
    }
}
