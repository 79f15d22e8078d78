//! Peer link as seen by the recorder
//!
//! The recorder never negotiates connectivity. It only reads the two
//! streams and the link status from whatever transport is in use.

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::error::RecordingResult;
use crate::media::synthetic::synthetic_stream;
use crate::media::{LocalMediaAcquirer, MediaConstraints, MediaStreamHandle, SyntheticPattern};
use crate::recording::{RecordingController, StopOutcome, StopTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Source of the local and remote streams for a live session
pub trait RealtimeMediaTransport: Send + Sync {
    fn local_stream(&self) -> Option<MediaStreamHandle>;

    /// Absent until the peer has joined
    fn remote_stream(&self) -> Option<MediaStreamHandle>;

    fn connection_status(&self) -> ConnectionStatus;
}

/// In-process transport: local media from an acquirer, remote media from a
/// synthetic peer
pub struct LoopbackTransport {
    acquirer: LocalMediaAcquirer,
    remote: RwLock<Option<MediaStreamHandle>>,
    status: RwLock<ConnectionStatus>,
}

impl LoopbackTransport {
    /// Acquire local media and bring up a synthetic peer
    pub async fn connect(mut acquirer: LocalMediaAcquirer, peer: SyntheticPattern) -> RecordingResult<Self> {
        acquirer.acquire().await?;
        let remote = synthetic_stream("remote", &peer, &MediaConstraints::default());
        info!("Loopback peer connected");

        Ok(Self {
            acquirer,
            remote: RwLock::new(Some(remote)),
            status: RwLock::new(ConnectionStatus::Connected),
        })
    }

    /// Flip the local microphone. Returns true when now muted.
    pub fn toggle_audio(&mut self) -> bool {
        self.acquirer.toggle_audio()
    }

    /// Flip the local camera. Returns true when now muted.
    pub fn toggle_video(&mut self) -> bool {
        self.acquirer.toggle_video()
    }

    pub fn acquirer(&self) -> &LocalMediaAcquirer {
        &self.acquirer
    }

    /// Simulate the peer leaving: the remote stream ends
    pub fn disconnect_peer(&self) {
        if let Some(remote) = self.remote.write().take() {
            info!("Loopback peer disconnected");
            remote.stop();
        }
        *self.status.write() = ConnectionStatus::Disconnected;
    }

    /// Turn the camera off. A running recording is stopped first.
    pub async fn stop_camera(&mut self, controller: &RecordingController) -> StopOutcome {
        let outcome = controller.stop(StopTrigger::ViewTeardown).await;
        self.acquirer.release();
        outcome
    }

    /// Leave the session: stop recording, release local media, drop the peer
    pub async fn hang_up(&mut self, controller: &RecordingController) -> StopOutcome {
        let outcome = self.stop_camera(controller).await;
        self.disconnect_peer();
        outcome
    }
}

impl RealtimeMediaTransport for LoopbackTransport {
    fn local_stream(&self) -> Option<MediaStreamHandle> {
        self.acquirer.stream().cloned()
    }

    fn remote_stream(&self) -> Option<MediaStreamHandle> {
        self.remote.read().clone()
    }

    fn connection_status(&self) -> ConnectionStatus {
        *self.status.read()
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        if let Some(remote) = self.remote.get_mut().take() {
            remote.stop();
        }
    }
}
