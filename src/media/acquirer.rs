use anyhow::Result;
use tracing::{info, warn};

use super::track::MediaStreamHandle;
use crate::error::{RecordingError, RecordingResult};

/// Which media kinds to request from the device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Camera/microphone provider
///
/// Platform-specific implementations open real devices; `SyntheticDevices`
/// serves test patterns.
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Open the requested devices. Errors mean denied or unavailable.
    async fn open(&self, constraints: &MediaConstraints) -> Result<MediaStreamHandle>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Owns the local participant's camera and microphone
pub struct LocalMediaAcquirer {
    devices: Box<dyn MediaDevices>,
    constraints: MediaConstraints,
    stream: Option<MediaStreamHandle>,
}

impl LocalMediaAcquirer {
    pub fn new(devices: Box<dyn MediaDevices>) -> Self {
        Self::with_constraints(devices, MediaConstraints::default())
    }

    pub fn with_constraints(devices: Box<dyn MediaDevices>, constraints: MediaConstraints) -> Self {
        Self {
            devices,
            constraints,
            stream: None,
        }
    }

    /// Open camera and microphone. Returns the existing stream if already acquired.
    pub async fn acquire(&mut self) -> RecordingResult<MediaStreamHandle> {
        if let Some(stream) = &self.stream {
            return Ok(stream.clone());
        }

        info!("Acquiring local media from {} devices", self.devices.name());

        let stream = self.devices.open(&self.constraints).await.map_err(|e| {
            warn!("Local media acquisition failed: {:#}", e);
            RecordingError::Acquisition(format!("{:#}", e))
        })?;

        info!(
            "Local media acquired (video={}, audio={})",
            stream.video().is_some(),
            stream.audio().is_some()
        );

        self.stream = Some(stream.clone());
        Ok(stream)
    }

    /// Stop all local tracks. Safe to call repeatedly or before `acquire`.
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("Releasing local media");
            stream.stop();
        }
    }

    pub fn stream(&self) -> Option<&MediaStreamHandle> {
        self.stream.as_ref()
    }

    /// Flip the microphone's enabled flag. Returns true when now muted.
    pub fn toggle_audio(&mut self) -> bool {
        match self.stream.as_ref().and_then(|s| s.audio()) {
            Some(track) => {
                track.set_enabled(!track.is_enabled());
                !track.is_enabled()
            }
            None => false,
        }
    }

    /// Flip the camera's enabled flag. Returns true when now muted.
    pub fn toggle_video(&mut self) -> bool {
        match self.stream.as_ref().and_then(|s| s.video()) {
            Some(track) => {
                track.set_enabled(!track.is_enabled());
                !track.is_enabled()
            }
            None => false,
        }
    }

    pub fn is_audio_muted(&self) -> bool {
        self.stream
            .as_ref()
            .and_then(|s| s.audio())
            .map(|t| !t.is_enabled())
            .unwrap_or(false)
    }

    pub fn is_video_muted(&self) -> bool {
        self.stream
            .as_ref()
            .and_then(|s| s.video())
            .map(|t| !t.is_enabled())
            .unwrap_or(false)
    }
}

impl Drop for LocalMediaAcquirer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::synthetic::{SyntheticDevices, SyntheticPattern};

    fn acquirer() -> LocalMediaAcquirer {
        LocalMediaAcquirer::new(Box::new(SyntheticDevices::new(
            SyntheticPattern::default().with_size(8, 8),
        )))
    }

    #[tokio::test]
    async fn test_acquire_returns_both_tracks() {
        let mut acquirer = acquirer();
        let stream = acquirer.acquire().await.unwrap();

        assert!(stream.video().is_some());
        assert!(stream.audio().is_some());
        assert!(stream.is_live());
    }

    #[tokio::test]
    async fn test_acquire_twice_reuses_stream() {
        let mut acquirer = acquirer();
        let first = acquirer.acquire().await.unwrap();
        let second = acquirer.acquire().await.unwrap();
        assert_eq!(first.video().unwrap().id(), second.video().unwrap().id());
    }

    #[tokio::test]
    async fn test_denied_devices_fail_with_acquisition_error() {
        let mut acquirer = LocalMediaAcquirer::new(Box::new(SyntheticDevices::denied()));
        let err = acquirer.acquire().await.unwrap_err();
        assert!(matches!(err, RecordingError::Acquisition(_)));
        assert!(acquirer.stream().is_none());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let mut acquirer = acquirer();
        acquirer.release();

        let stream = acquirer.acquire().await.unwrap();
        acquirer.release();
        acquirer.release();

        assert!(!stream.is_live());
        assert!(acquirer.stream().is_none());
    }

    #[tokio::test]
    async fn test_toggles_report_muted_state() {
        let mut acquirer = acquirer();
        assert!(!acquirer.toggle_audio(), "nothing acquired yet");

        let stream = acquirer.acquire().await.unwrap();
        assert!(acquirer.toggle_audio());
        assert!(acquirer.is_audio_muted());
        assert!(!stream.audio().unwrap().is_enabled());
        assert!(!acquirer.toggle_audio());

        assert!(acquirer.toggle_video());
        assert!(acquirer.is_video_muted());
        assert!(stream.is_live(), "muting must not end the stream");
    }
}
