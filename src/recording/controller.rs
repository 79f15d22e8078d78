// Recording session controller
//
// Owns the state machine and, while recording, the four running resources:
// mix graph, redraw loop, capture engine and duration timer. All mutation
// goes through the session slot mutex, so concurrent stop() calls from
// different triggers serialize and exactly one of them runs the teardown.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use super::finalizer::{Artifact, ArtifactFinalizer};
use super::state::{RecordingState, SessionContext, StopOutcome, StopTrigger};
use super::timer::DurationTimer;
use crate::audio::{AudioMixGraph, MixReport, MixerConfig};
use crate::capture::{CaptureConfig, SegmentBuffer, SegmentCaptureEngine, SharedSegmentBuffer};
use crate::error::{RecordingError, RecordingResult};
use crate::events::SessionEvent;
use crate::media::MediaStreamHandle;
use crate::resources::{ResourceLedger, ResourceSnapshot};
use crate::storage::{ArtifactMetadata, PersistenceBackend, StoredRecording};
use crate::video::{CompositorConfig, FrameCompositor};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Pipeline settings used for every recording of a controller
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    pub compositor: CompositorConfig,
    pub mixer: MixerConfig,
    pub capture: CaptureConfig,
}

/// Serializable view of a controller
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: uuid::Uuid,
    pub owner_id: String,
    pub label: String,
    pub state: RecordingState,
    pub elapsed_seconds: u64,
    pub segment_count: usize,
    pub byte_size: usize,
    pub frames_composited: u64,
    pub mix: Option<MixReport>,
    pub last_stop: Option<StopTrigger>,
    pub upload_attempts: u32,
    pub artifact: Option<ArtifactMetadata>,
    pub url: Option<String>,
    pub resources: ResourceSnapshot,
}

/// Resources that only exist while recording
struct ActiveRecording {
    mix: AudioMixGraph,
    compositor: FrameCompositor,
    capture: SegmentCaptureEngine,
    timer: DurationTimer,
    disconnect_cancel: Option<oneshot::Sender<()>>,
}

struct SessionSlot {
    local: Option<MediaStreamHandle>,
    remote: Option<MediaStreamHandle>,
    active: Option<ActiveRecording>,
    buffer: SharedSegmentBuffer,
    mime_type: String,
    artifact: Option<Artifact>,
    finalized: bool,
    stored: Option<StoredRecording>,
    mix_report: Option<MixReport>,
    last_trigger: Option<StopTrigger>,
    frames_composited: u64,
    upload_attempts: u32,
}

impl SessionSlot {
    fn new(mime_type: &str) -> Self {
        Self {
            local: None,
            remote: None,
            active: None,
            buffer: SegmentBuffer::shared(),
            mime_type: mime_type.to_string(),
            artifact: None,
            finalized: false,
            stored: None,
            mix_report: None,
            last_trigger: None,
            frames_composited: 0,
            upload_attempts: 0,
        }
    }
}

struct ControllerInner {
    context: SessionContext,
    config: ControllerConfig,
    state: RwLock<RecordingState>,
    slot: Mutex<SessionSlot>,
    elapsed: Arc<AtomicU64>,
    ledger: ResourceLedger,
    events: broadcast::Sender<SessionEvent>,
}

/// Drives one session from arming through persistence.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct RecordingController {
    inner: Arc<ControllerInner>,
}

impl RecordingController {
    pub fn new(context: SessionContext, config: ControllerConfig) -> Self {
        Self::with_ledger(context, config, ResourceLedger::new())
    }

    /// Share a ledger across controllers to observe resources process-wide
    pub fn with_ledger(
        context: SessionContext,
        config: ControllerConfig,
        ledger: ResourceLedger,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let slot = SessionSlot::new(&config.capture.mime_type);

        Self {
            inner: Arc::new(ControllerInner {
                context,
                config,
                state: RwLock::new(RecordingState::Idle),
                slot: Mutex::new(slot),
                elapsed: Arc::new(AtomicU64::new(0)),
                ledger,
                events,
            }),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.inner.context
    }

    pub fn state(&self) -> RecordingState {
        *self.inner.state.read()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.inner.elapsed.load(Ordering::SeqCst)
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.inner.ledger
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn set_state(&self, state: RecordingState) {
        let previous = std::mem::replace(&mut *self.inner.state.write(), state);
        debug!(
            "Session {}: {} -> {}",
            self.inner.context.session_id, previous, state
        );
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Confirm both parties' media is present. `Idle -> Armed`.
    pub async fn arm(
        &self,
        local: Option<&MediaStreamHandle>,
        remote: Option<&MediaStreamHandle>,
    ) -> RecordingResult<()> {
        let mut slot = self.inner.slot.lock().await;
        let state = self.state();
        if state != RecordingState::Idle {
            return Err(RecordingError::wrong_state("arm()", state));
        }

        let local = local.ok_or_else(|| RecordingError::state("missing local stream"))?;
        let remote = remote.ok_or_else(|| RecordingError::state("missing remote stream"))?;
        if !local.has_media() {
            return Err(RecordingError::state("local stream carries no media"));
        }
        if !remote.has_media() {
            return Err(RecordingError::state("remote stream carries no media"));
        }

        slot.local = Some(local.clone());
        slot.remote = Some(remote.clone());
        self.set_state(RecordingState::Armed);

        info!(
            "Session {} armed (local={}, remote={})",
            self.inner.context.session_id,
            local.id(),
            remote.id()
        );
        self.emit(SessionEvent::Armed);
        Ok(())
    }

    /// Build the pipeline and begin capturing. `Armed -> Recording`.
    ///
    /// On failure every resource acquired so far is released and the
    /// session stays `Armed`.
    pub async fn start(&self) -> RecordingResult<()> {
        let mut slot = self.inner.slot.lock().await;
        let state = self.state();
        if state != RecordingState::Armed {
            return Err(RecordingError::wrong_state("start()", state));
        }

        let (Some(local), Some(remote)) = (slot.local.clone(), slot.remote.clone()) else {
            return Err(RecordingError::state("armed without streams"));
        };

        info!("Starting recording for session {}", self.inner.context.session_id);

        let (active, buffer) = match self.build_pipeline(&local, &remote).await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!("Failed to start recording: {}", e);
                self.emit(SessionEvent::StartFailed {
                    code: e.code().to_string(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let mix = active.mix.report();

        self.inner.elapsed.store(0, Ordering::SeqCst);
        slot.buffer = buffer;
        slot.mime_type = active.capture.mime_type().to_string();
        slot.mix_report = Some(mix);
        slot.artifact = None;
        slot.finalized = false;
        slot.stored = None;
        slot.last_trigger = None;
        slot.frames_composited = 0;
        slot.upload_attempts = 0;
        slot.active = Some(active);

        self.set_state(RecordingState::Recording);
        info!("Recording started for session {}", self.inner.context.session_id);
        self.emit(SessionEvent::Started { mix });
        Ok(())
    }

    async fn build_pipeline(
        &self,
        local: &MediaStreamHandle,
        remote: &MediaStreamHandle,
    ) -> RecordingResult<(ActiveRecording, SharedSegmentBuffer)> {
        let config = &self.inner.config;
        let ledger = &self.inner.ledger;
        let buffer = SegmentBuffer::shared();

        config.mixer.validate()?;
        let mut mix = AudioMixGraph::build(local, remote, config.mixer.clone(), ledger);

        let mut compositor = match FrameCompositor::start(local, remote, &config.compositor, ledger) {
            Ok(compositor) => compositor,
            Err(e) => {
                unwind_mix(&mut mix).await;
                return Err(e);
            }
        };

        let mixed_audio = match mix.output_track() {
            Ok(track) => track,
            Err(e) => {
                compositor.stop().await;
                unwind_mix(&mut mix).await;
                return Err(e);
            }
        };

        let capture = match SegmentCaptureEngine::start(
            Some(compositor.output_track()),
            Some(mixed_audio),
            &config.capture,
            Arc::clone(&buffer),
            ledger,
        ) {
            Ok(capture) => capture,
            Err(e) => {
                warn!("Capture engine failed to start, rolling back: {}", e);
                compositor.stop().await;
                unwind_mix(&mut mix).await;
                return Err(e);
            }
        };

        let timer = DurationTimer::start(Arc::clone(&self.inner.elapsed), ledger);
        let disconnect_cancel = self.spawn_disconnect_guard(remote.clone());

        Ok((
            ActiveRecording {
                mix,
                compositor,
                capture,
                timer,
                disconnect_cancel: Some(disconnect_cancel),
            },
            buffer,
        ))
    }

    /// Stop the recording when the remote stream as a whole ends
    fn spawn_disconnect_guard(&self, remote: MediaStreamHandle) -> oneshot::Sender<()> {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel_rx => {}
                _ = remote.ended() => {
                    let Some(inner) = weak.upgrade() else { return };
                    warn!("Remote stream {} ended during recording", remote.id());
                    RecordingController { inner }
                        .stop(StopTrigger::PeerDisconnected)
                        .await;
                }
            }
        });

        cancel_tx
    }

    /// Tear the pipeline down. `Recording -> Stopping -> Stopped`.
    ///
    /// Safe to call from any state and any number of times; only the call
    /// that finds the session recording runs the teardown.
    pub async fn stop(&self, trigger: StopTrigger) -> StopOutcome {
        let mut slot = self.inner.slot.lock().await;
        let state = self.state();
        if state != RecordingState::Recording {
            debug!("stop({:?}) ignored while {}", trigger, state);
            return StopOutcome::AlreadyStopped;
        }
        let Some(mut active) = slot.active.take() else {
            return StopOutcome::AlreadyStopped;
        };

        info!(
            "Stopping recording for session {} ({:?})",
            self.inner.context.session_id, trigger
        );
        self.set_state(RecordingState::Stopping);
        self.emit(SessionEvent::Stopping { trigger });

        if let Some(cancel) = active.disconnect_cancel.take() {
            let _ = cancel.send(());
        }

        active.timer.stop().await;
        active.capture.stop().await;
        active.compositor.stop().await;
        if let Err(e) = active.mix.dispose().await {
            warn!("Mix graph teardown: {}", e);
        }

        slot.frames_composited = active.compositor.frames_drawn();
        slot.last_trigger = Some(trigger);
        let (segment_count, byte_size) = {
            let mut buffer = slot.buffer.lock();
            buffer.seal();
            (buffer.len(), buffer.total_bytes())
        };
        drop(active);
        self.inner.ledger.record_teardown();

        let elapsed_seconds = self.elapsed_seconds();
        self.set_state(RecordingState::Stopped);
        info!(
            "Recording stopped: {}s, {} segments, {} bytes",
            elapsed_seconds, segment_count, byte_size
        );
        self.emit(SessionEvent::Stopped {
            trigger,
            elapsed_seconds,
            segment_count,
            byte_size,
        });

        StopOutcome::Stopped
    }

    /// Stop on behalf of a view or service that is going away
    pub async fn shutdown(&self) -> StopOutcome {
        self.stop(StopTrigger::ViewTeardown).await
    }

    /// Build the artifact from the captured segments. Valid once, from `Stopped`.
    pub async fn finalize(&self) -> RecordingResult<Artifact> {
        let mut slot = self.inner.slot.lock().await;
        let state = self.state();
        if state != RecordingState::Stopped {
            return Err(RecordingError::wrong_state("finalize()", state));
        }
        if slot.finalized {
            return Err(RecordingError::state("recording was already finalized"));
        }

        let result = {
            let buffer = slot.buffer.lock();
            ArtifactFinalizer::finalize(
                &buffer,
                self.elapsed_seconds(),
                &slot.mime_type,
                &self.inner.context,
            )
        };

        let artifact = match result {
            Ok(artifact) => artifact,
            Err(RecordingError::EmptyRecording) => {
                warn!(
                    "Session {} captured nothing; not saving",
                    self.inner.context.session_id
                );
                return Err(RecordingError::EmptyRecording);
            }
            Err(e) => return Err(e),
        };

        slot.finalized = true;
        slot.artifact = Some(artifact.clone());

        let metadata = artifact.metadata();
        self.emit(SessionEvent::Finalized {
            filename: metadata.filename.clone(),
            byte_size: metadata.byte_size,
            duration_seconds: metadata.duration_seconds,
        });
        Ok(artifact)
    }

    /// Hand the artifact to `backend`. Valid from `Stopped` (after finalize)
    /// and from `UploadFailed` (retry).
    ///
    /// A failed upload leaves the session in `UploadFailed` with the artifact
    /// retained.
    pub async fn persist(&self, backend: &dyn PersistenceBackend) -> RecordingResult<StoredRecording> {
        let (artifact, attempt) = {
            let mut slot = self.inner.slot.lock().await;
            let state = self.state();
            if !matches!(state, RecordingState::Stopped | RecordingState::UploadFailed) {
                return Err(RecordingError::wrong_state("persist()", state));
            }
            let Some(artifact) = slot.artifact.clone() else {
                return Err(RecordingError::state("nothing to persist; finalize() first"));
            };

            slot.upload_attempts += 1;
            self.set_state(RecordingState::Uploading);
            (artifact, slot.upload_attempts)
        };

        info!(
            "Persisting {} via {} backend (attempt {})",
            artifact.metadata().filename,
            backend.name(),
            attempt
        );
        self.emit(SessionEvent::Uploading { attempt });

        // The slot is not held during the upload; `Uploading` keeps other operations out
        let result = backend.persist(artifact.bytes(), artifact.metadata()).await;

        let mut slot = self.inner.slot.lock().await;
        match result {
            Ok(stored) => {
                slot.stored = Some(stored.clone());
                self.set_state(RecordingState::Persisted);
                info!("Recording persisted at {}", stored.url);
                self.emit(SessionEvent::Persisted {
                    url: stored.url.clone(),
                });
                Ok(stored)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                self.set_state(RecordingState::UploadFailed);
                error!("Upload attempt {} failed: {}", attempt, message);
                self.emit(SessionEvent::UploadFailed {
                    attempt,
                    error: message.clone(),
                });
                Err(RecordingError::Upload(message))
            }
        }
    }

    /// Finalize if that has not happened yet, then persist. Retry-safe.
    pub async fn save(&self, backend: &dyn PersistenceBackend) -> RecordingResult<StoredRecording> {
        if self.state() == RecordingState::Stopped {
            let finalized = self.inner.slot.lock().await.finalized;
            if !finalized {
                self.finalize().await?;
            }
        }
        self.persist(backend).await
    }

    /// Return to `Idle` so the controller can record again.
    ///
    /// Refused while an artifact is waiting to be persisted.
    pub async fn reset(&self) -> RecordingResult<()> {
        let mut slot = self.inner.slot.lock().await;
        let state = self.state();
        if !state.can_reset() {
            return Err(RecordingError::wrong_state("reset()", state));
        }
        if slot.artifact.is_some() && state != RecordingState::Persisted {
            return Err(RecordingError::state("artifact has not been persisted"));
        }

        *slot = SessionSlot::new(&self.inner.config.capture.mime_type);
        self.inner.elapsed.store(0, Ordering::SeqCst);
        self.set_state(RecordingState::Idle);

        info!("Session {} reset", self.inner.context.session_id);
        self.emit(SessionEvent::Reset);
        Ok(())
    }

    /// The finalized artifact, if any
    pub async fn artifact(&self) -> Option<Artifact> {
        self.inner.slot.lock().await.artifact.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        let slot = self.inner.slot.lock().await;
        let (segment_count, byte_size) = {
            let buffer = slot.buffer.lock();
            (buffer.len(), buffer.total_bytes())
        };
        let frames_composited = match &slot.active {
            Some(active) => active.compositor.frames_drawn(),
            None => slot.frames_composited,
        };
        let context = &self.inner.context;

        SessionStatus {
            session_id: context.session_id,
            owner_id: context.owner_id.clone(),
            label: context.label.clone(),
            state: self.state(),
            elapsed_seconds: self.elapsed_seconds(),
            segment_count,
            byte_size,
            frames_composited,
            mix: slot.mix_report,
            last_stop: slot.last_trigger,
            upload_attempts: slot.upload_attempts,
            artifact: slot.artifact.as_ref().map(|a| a.metadata().clone()),
            url: slot.stored.as_ref().map(|s| s.url.clone()),
            resources: self.inner.ledger.snapshot(),
        }
    }
}

async fn unwind_mix(mix: &mut AudioMixGraph) {
    if let Err(e) = mix.dispose().await {
        warn!("Mix graph rollback: {}", e);
    }
}
