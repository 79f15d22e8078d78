use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Decoded video frame (RGBA8, row-major, no padding)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Raw pixels, `width * height * 4` bytes
    pub data: Vec<u8>,
    /// Timestamp in milliseconds since the source started
    pub timestamp_ms: u64,
}

impl VideoFrame {
    /// Frame filled with a single colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], timestamp_ms: u64) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }

        Self {
            width,
            height,
            data,
            timestamp_ms,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        let px = self.data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the source started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn silence(sample_count: usize, sample_rate: u32, channels: u16, timestamp_ms: u64) -> Self {
        Self {
            samples: vec![0; sample_count],
            sample_rate,
            channels,
            timestamp_ms,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0)
    }
}

#[derive(Debug)]
struct TrackState {
    id: Uuid,
    label: String,
    enabled: AtomicBool,
    ended: AtomicBool,
}

impl TrackState {
    fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            label: label.to_string(),
            enabled: AtomicBool::new(true),
            ended: AtomicBool::new(false),
        })
    }
}

/// Live video source. Clones share the same underlying track, so a mute
/// applied through one handle is seen by every observer.
#[derive(Clone, Debug)]
pub struct VideoTrack {
    state: Arc<TrackState>,
    frames: Arc<watch::Sender<Option<Arc<VideoFrame>>>>,
}

impl VideoTrack {
    pub fn new(label: &str) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            state: TrackState::new(label),
            frames: Arc::new(tx),
        }
    }

    /// Publish a new current frame. Returns false once the track has ended.
    pub fn push_frame(&self, frame: VideoFrame) -> bool {
        if !self.is_live() {
            return false;
        }
        self.frames.send_replace(Some(Arc::new(frame)));
        true
    }

    /// Most recent frame, or None if nothing was produced yet or the track ended
    pub fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        if !self.is_live() {
            return None;
        }
        self.frames.borrow().clone()
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn label(&self) -> &str {
        &self.state.label
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        !self.state.ended.load(Ordering::SeqCst)
    }

    /// End the track permanently
    pub fn stop(&self) {
        self.state.ended.store(true, Ordering::SeqCst);
        self.frames.send_replace(None);
    }
}

/// Live audio source with fan-out to any number of taps
#[derive(Clone, Debug)]
pub struct AudioTrack {
    state: Arc<TrackState>,
    frames: broadcast::Sender<AudioFrame>,
}

impl AudioTrack {
    pub fn new(label: &str) -> Self {
        Self::with_capacity(label, 256)
    }

    pub fn with_capacity(label: &str, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            state: TrackState::new(label),
            frames: tx,
        }
    }

    /// Deliver a frame to every current tap. Returns false once the track has ended.
    pub fn push_frame(&self, frame: AudioFrame) -> bool {
        if !self.is_live() {
            return false;
        }
        // No receivers is fine: nobody is listening yet
        let _ = self.frames.send(frame);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.frames.subscribe()
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn label(&self) -> &str {
        &self.state.label
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        !self.state.ended.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.state.ended.store(true, Ordering::SeqCst);
    }
}

/// A participant's media: zero-or-one video track, zero-or-one audio track
/// and a liveness flag owned by whoever produced the stream.
#[derive(Clone, Debug)]
pub struct MediaStreamHandle {
    id: String,
    video: Option<VideoTrack>,
    audio: Option<AudioTrack>,
    live: Arc<watch::Sender<bool>>,
}

impl MediaStreamHandle {
    pub fn new(id: impl Into<String>, video: Option<VideoTrack>, audio: Option<AudioTrack>) -> Self {
        let (tx, _rx) = watch::channel(true);
        Self {
            id: id.into(),
            video,
            audio,
            live: Arc::new(tx),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn video(&self) -> Option<&VideoTrack> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&AudioTrack> {
        self.audio.as_ref()
    }

    /// At least one media kind is present
    pub fn has_media(&self) -> bool {
        self.video.is_some() || self.audio.is_some()
    }

    pub fn is_live(&self) -> bool {
        *self.live.borrow()
    }

    /// Stop every track and mark the stream ended. Idempotent.
    pub fn stop(&self) {
        if let Some(video) = &self.video {
            video.stop();
        }
        if let Some(audio) = &self.audio {
            audio.stop();
        }
        self.live.send_replace(false);
    }

    /// Resolves once the stream has ended
    pub async fn ended(&self) {
        let mut rx = self.live.subscribe();
        // The sender lives as long as `self`, so this only errors on shutdown
        let _ = rx.wait_for(|live| !*live).await;
    }
}

/// Receive from an optional tap; pends forever when the tap is absent so it
/// can sit in a `select!` next to other branches.
pub(crate) async fn recv_tap(
    tap: &mut Option<broadcast::Receiver<AudioFrame>>,
) -> Result<AudioFrame, broadcast::error::RecvError> {
    match tap {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_track_current_frame_lifecycle() {
        let track = VideoTrack::new("camera");
        assert!(track.current_frame().is_none());

        assert!(track.push_frame(VideoFrame::solid(2, 2, [1, 2, 3, 255], 0)));
        let frame = track.current_frame().unwrap();
        assert_eq!(frame.pixel(1, 1), Some([1, 2, 3, 255]));

        track.stop();
        assert!(track.current_frame().is_none());
        assert!(!track.push_frame(VideoFrame::solid(2, 2, [0, 0, 0, 255], 1)));
    }

    #[test]
    fn test_clones_share_enabled_flag() {
        let track = AudioTrack::new("mic");
        let observer = track.clone();
        track.set_enabled(false);
        assert!(!observer.is_enabled());
    }

    #[test]
    fn test_stream_stop_ends_all_tracks() {
        let stream = MediaStreamHandle::new(
            "local",
            Some(VideoTrack::new("camera")),
            Some(AudioTrack::new("mic")),
        );
        assert!(stream.is_live());
        assert!(stream.has_media());

        stream.stop();
        stream.stop();

        assert!(!stream.is_live());
        assert!(!stream.video().unwrap().is_live());
        assert!(!stream.audio().unwrap().is_live());
    }

    #[test]
    fn test_stream_without_tracks_has_no_media() {
        let stream = MediaStreamHandle::new("empty", None, None);
        assert!(!stream.has_media());
    }

    #[tokio::test]
    async fn test_ended_resolves_after_stop() {
        let stream = MediaStreamHandle::new("remote", None, Some(AudioTrack::new("mic")));
        let watcher = stream.clone();
        let handle = tokio::spawn(async move { watcher.ended().await });

        stream.stop();
        handle.await.unwrap();
    }

    #[test]
    fn test_malformed_frame_detected() {
        let mut frame = VideoFrame::solid(4, 4, [0, 0, 0, 255], 0);
        assert!(frame.is_well_formed());
        frame.data.pop();
        assert!(!frame.is_well_formed());
    }
}
