//! Timeslice capture of the composite video and mixed audio
//!
//! Frames are sampled from the composite track at `capture_fps`, mixed audio
//! is encoded as it arrives, and every `timeslice` the encoded bytes are cut
//! into a segment and appended to the shared buffer.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::buffer::SharedSegmentBuffer;
use super::encoder::{encoder_for, SegmentEncoder, SREC_MIME};
use crate::error::{RecordingError, RecordingResult};
use crate::media::track::recv_tap;
use crate::media::{AudioFrame, AudioTrack, VideoFrame, VideoTrack};
use crate::resources::{ResourceGuard, ResourceKind, ResourceLedger};

/// Configuration for segment capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Container format requested from the encoder
    pub mime_type: String,
    /// Composite frames sampled per second
    pub capture_fps: u32,
    /// Interval at which encoded data is emitted as a segment
    pub timeslice: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mime_type: SREC_MIME.to_string(),
            capture_fps: 30,
            timeslice: Duration::from_millis(1000),
        }
    }
}

/// Counters returned by the capture task when it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub segments_emitted: u64,
    pub encode_errors: u64,
}

pub struct SegmentCaptureEngine {
    mime_type: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<CaptureStats>>,
    stats: Option<CaptureStats>,
    guard: Option<ResourceGuard>,
}

impl SegmentCaptureEngine {
    /// Start capturing with the encoder registered for `config.mime_type`
    pub fn start(
        video: Option<VideoTrack>,
        audio: Option<AudioTrack>,
        config: &CaptureConfig,
        buffer: SharedSegmentBuffer,
        ledger: &ResourceLedger,
    ) -> RecordingResult<Self> {
        let encoder = encoder_for(&config.mime_type)?;
        Self::start_with_encoder(video, audio, config, encoder, buffer, ledger)
    }

    pub fn start_with_encoder(
        video: Option<VideoTrack>,
        audio: Option<AudioTrack>,
        config: &CaptureConfig,
        encoder: Box<dyn SegmentEncoder>,
        buffer: SharedSegmentBuffer,
        ledger: &ResourceLedger,
    ) -> RecordingResult<Self> {
        if video.is_none() && audio.is_none() {
            return Err(RecordingError::Encoding("no tracks to capture".into()));
        }
        if config.capture_fps == 0 || config.timeslice.is_zero() {
            return Err(RecordingError::Encoding(format!(
                "invalid capture cadence: {} fps, {}ms timeslice",
                config.capture_fps,
                config.timeslice.as_millis()
            )));
        }

        let mime_type = encoder.mime_type().to_string();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let audio_rx = audio.as_ref().map(|track| track.subscribe());

        let task = tokio::spawn(run_capture_loop(
            encoder,
            video,
            audio,
            audio_rx,
            Duration::from_secs_f64(1.0 / config.capture_fps as f64),
            config.timeslice,
            buffer,
            shutdown_rx,
        ));

        info!(
            "Segment capture started: {} @ {}fps, {}ms timeslice",
            mime_type,
            config.capture_fps,
            config.timeslice.as_millis()
        );

        Ok(Self {
            mime_type,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            stats: None,
            guard: Some(ledger.acquire(ResourceKind::CaptureEngine)),
        })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Stats of the finished capture, available after `stop`
    pub fn stats(&self) -> Option<CaptureStats> {
        self.stats
    }

    /// Stop capturing. The final partial segment is flushed before this
    /// returns; nothing is appended afterwards.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match task.await {
            Ok(stats) => {
                info!(
                    "Segment capture stopped: {} segments, {} video / {} audio frames",
                    stats.segments_emitted, stats.video_frames, stats.audio_frames
                );
                self.stats = Some(stats);
            }
            Err(e) => warn!("Capture task ended abnormally: {}", e),
        }

        if let Some(guard) = self.guard.take() {
            guard.release();
        }
    }
}

impl Drop for SegmentCaptureEngine {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            warn!("Capture engine dropped while running; aborting capture task");
            task.abort();
        }
    }
}

fn flush_segment(
    encoder: &mut dyn SegmentEncoder,
    buffer: &SharedSegmentBuffer,
    stats: &mut CaptureStats,
) {
    let data = encoder.take_segment();
    if data.is_empty() {
        return;
    }
    if buffer.lock().append(data).is_some() {
        stats.segments_emitted += 1;
    }
}

async fn run_capture_loop(
    mut encoder: Box<dyn SegmentEncoder>,
    video: Option<VideoTrack>,
    audio: Option<AudioTrack>,
    mut audio_rx: Option<broadcast::Receiver<AudioFrame>>,
    frame_period: Duration,
    timeslice: Duration,
    buffer: SharedSegmentBuffer,
    mut shutdown: oneshot::Receiver<()>,
) -> CaptureStats {
    let mut stats = CaptureStats::default();
    let mut last_frame: Option<Arc<VideoFrame>> = None;

    let mut frame_ticker = interval(frame_period);
    frame_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut slice_ticker = interval_at(Instant::now() + timeslice, timeslice);
    slice_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = slice_ticker.tick() => {
                flush_segment(encoder.as_mut(), &buffer, &mut stats);
            }
            result = recv_tap(&mut audio_rx) => match result {
                Ok(frame) => {
                    if audio.as_ref().is_some_and(|track| !track.is_enabled()) {
                        continue;
                    }
                    match encoder.encode_audio(&frame) {
                        Ok(()) => stats.audio_frames += 1,
                        Err(e) => {
                            stats.encode_errors += 1;
                            warn!("Failed to encode audio frame: {:#}", e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Capture fell behind the audio track, {} frames skipped", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Audio track closed");
                    audio_rx = None;
                }
            },
            _ = frame_ticker.tick() => {
                let Some(track) = &video else { continue };
                let Some(frame) = track.current_frame() else { continue };
                if last_frame.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, &frame)) {
                    continue;
                }
                // PNG compression is CPU bound; keep it off the async workers
                let job = {
                    let frame = Arc::clone(&frame);
                    tokio::task::spawn_blocking(move || {
                        let result = encoder.encode_video(&frame);
                        (encoder, result)
                    })
                };
                let (returned, result) = match job.await {
                    Ok(done) => done,
                    Err(e) => {
                        error!("Video encode task failed, capture aborted: {}", e);
                        return stats;
                    }
                };
                encoder = returned;
                match result {
                    Ok(()) => stats.video_frames += 1,
                    Err(e) => {
                        stats.encode_errors += 1;
                        warn!("Failed to encode video frame: {:#}", e);
                    }
                }
                last_frame = Some(frame);
            }
        }
    }

    // Only already-encoded data makes it into the final segment
    flush_segment(encoder.as_mut(), &buffer, &mut stats);
    stats
}
