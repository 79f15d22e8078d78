// Audio mix graph for combining the two participants' audio
//
// Two optional input taps (local, remote) feed one output track. Incoming
// frames are buffered per tap; every render quantum the graph pulls one
// quantum of samples from each tap (zero-padding short buffers) and mixes
// them by addition with clipping. A missing, muted or ended source simply
// contributes silence, so the output always carries a signal.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{RecordingError, RecordingResult};
use crate::media::track::recv_tap;
use crate::media::{AudioFrame, AudioTrack, MediaStreamHandle};
use crate::resources::{ResourceGuard, ResourceKind, ResourceLedger};

/// Configuration for the mix graph
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Output sample rate; inputs at other rates are dropped
    pub sample_rate: u32,
    /// Output channel count; inputs with other counts are dropped
    pub channels: u16,
    /// Render quantum (output frame length)
    pub quantum: Duration,
    /// Maximum audio buffered per tap before the oldest samples are dropped
    pub max_buffer_delay: Duration,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            quantum: Duration::from_millis(20),
            max_buffer_delay: Duration::from_millis(200),
        }
    }
}

impl MixerConfig {
    /// Reject settings the render loop cannot run with
    pub fn validate(&self) -> RecordingResult<()> {
        if self.sample_rate == 0 || self.channels == 0 || self.quantum.is_zero() {
            return Err(RecordingError::MixGraph(format!(
                "invalid mixer format: {} Hz, {} channels, {}ms quantum",
                self.sample_rate,
                self.channels,
                self.quantum.as_millis()
            )));
        }
        if self.samples_per_quantum() == 0 {
            return Err(RecordingError::MixGraph(format!(
                "{}us quantum holds no samples at {} Hz",
                self.quantum.as_micros(),
                self.sample_rate
            )));
        }
        Ok(())
    }

    /// Interleaved samples in one render quantum
    pub fn samples_per_quantum(&self) -> usize {
        let per_channel = self.sample_rate as u128 * self.quantum.as_micros() / 1_000_000;
        per_channel as usize * self.channels as usize
    }

    fn max_buffered_samples(&self) -> usize {
        let per_channel = self.sample_rate as u128 * self.max_buffer_delay.as_micros() / 1_000_000;
        (per_channel as usize * self.channels as usize).max(self.samples_per_quantum())
    }
}

/// Input tap of the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixInput {
    Local,
    Remote,
}

/// Which inputs were connected when the graph was built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixReport {
    pub local_connected: bool,
    pub remote_connected: bool,
}

impl MixReport {
    /// Neither party had an audio track: output is silence
    pub fn is_silent(&self) -> bool {
        !self.local_connected && !self.remote_connected
    }

    pub fn is_degraded(&self) -> bool {
        !(self.local_connected && self.remote_connected)
    }
}

/// Sample-level mixing state, independent of any runtime
pub struct AudioMixer {
    config: MixerConfig,
    /// Pending samples for each connected tap
    buffers: HashMap<MixInput, VecDeque<i16>>,
    quanta_rendered: u64,
}

impl AudioMixer {
    pub fn new(config: MixerConfig, inputs: &[MixInput]) -> Self {
        let buffers = inputs.iter().map(|input| (*input, VecDeque::new())).collect();
        Self {
            config,
            buffers,
            quanta_rendered: 0,
        }
    }

    /// Buffer a frame from the given tap
    pub fn buffer_frame(&mut self, input: MixInput, frame: &AudioFrame) {
        if frame.sample_rate != self.config.sample_rate {
            warn!(
                "{:?} frame sample rate mismatch: expected {}, got {}. Dropping frame.",
                input, self.config.sample_rate, frame.sample_rate
            );
            return;
        }

        if frame.channels != self.config.channels {
            warn!(
                "{:?} frame channel count mismatch: expected {}, got {}. Dropping frame.",
                input, self.config.channels, frame.channels
            );
            return;
        }

        let max_buffered = self.config.max_buffered_samples();
        if let Some(buffer) = self.buffers.get_mut(&input) {
            buffer.extend(frame.samples.iter().copied());

            // Bound latency: drop the oldest samples beyond the buffer window
            if buffer.len() > max_buffered {
                let excess = buffer.len() - max_buffered;
                debug!("Dropping {} stale {:?} samples", excess, input);
                buffer.drain(..excess);
            }
        }
    }

    /// Stop mixing a tap (its source ended)
    pub fn disconnect(&mut self, input: MixInput) {
        if self.buffers.remove(&input).is_some() {
            info!("{:?} audio input ended, mixing remaining sources", input);
        }
    }

    pub fn is_connected(&self, input: MixInput) -> bool {
        self.buffers.contains_key(&input)
    }

    /// Render one quantum. Taps listed in `muted` are drained but contribute silence.
    pub fn render_quantum(&mut self, muted: &[MixInput]) -> AudioFrame {
        let len = self.config.samples_per_quantum();
        let mut sums = vec![0i32; len];

        for (input, buffer) in &mut self.buffers {
            let take = buffer.len().min(len);
            let is_muted = muted.contains(input);
            for (i, sample) in buffer.drain(..take).enumerate() {
                if !is_muted {
                    sums[i] += sample as i32;
                }
            }
        }

        let samples = sums
            .into_iter()
            .map(|sum| sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
            .collect();

        let timestamp_ms = self.quanta_rendered * self.config.quantum.as_millis() as u64;
        self.quanta_rendered += 1;

        AudioFrame {
            samples,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            timestamp_ms,
        }
    }

    pub fn quanta_rendered(&self) -> u64 {
        self.quanta_rendered
    }
}

struct Tap {
    input: MixInput,
    track: AudioTrack,
    rx: Option<broadcast::Receiver<AudioFrame>>,
}

impl Tap {
    fn connect(input: MixInput, stream: &MediaStreamHandle) -> Option<Self> {
        stream.audio().map(|track| Tap {
            input,
            track: track.clone(),
            rx: Some(track.subscribe()),
        })
    }
}

/// The running graph: one processing task, one output track
pub struct AudioMixGraph {
    output: Option<AudioTrack>,
    report: MixReport,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<u64>>,
    guard: Option<ResourceGuard>,
}

impl AudioMixGraph {
    /// Connect whichever of the two streams carries audio and start rendering.
    ///
    /// Never fails: a stream without an audio track is logged and skipped.
    pub fn build(
        local: &MediaStreamHandle,
        remote: &MediaStreamHandle,
        config: MixerConfig,
        ledger: &ResourceLedger,
    ) -> Self {
        let local_tap = Tap::connect(MixInput::Local, local);
        let remote_tap = Tap::connect(MixInput::Remote, remote);

        let report = MixReport {
            local_connected: local_tap.is_some(),
            remote_connected: remote_tap.is_some(),
        };

        if report.is_silent() {
            warn!("Neither participant has an audio track; mixed output will be silent");
        } else if report.is_degraded() {
            warn!(
                "Mixing with a single audio source (local={}, remote={})",
                report.local_connected, report.remote_connected
            );
        }

        let inputs: Vec<MixInput> = [&local_tap, &remote_tap]
            .into_iter()
            .flatten()
            .map(|tap| tap.input)
            .collect();
        let mixer = AudioMixer::new(config.clone(), &inputs);
        let output = AudioTrack::new("mixed-audio");

        info!(
            "Audio mix graph built: {}Hz, {} channels, {}ms quantum, {} input(s)",
            config.sample_rate,
            config.channels,
            config.quantum.as_millis(),
            inputs.len()
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_mix_loop(
            mixer,
            local_tap,
            remote_tap,
            output.clone(),
            config.quantum,
            shutdown_rx,
        ));

        Self {
            output: Some(output),
            report,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            guard: Some(ledger.acquire(ResourceKind::MixGraph)),
        }
    }

    /// The mixed track. Errors once the graph has been disposed.
    pub fn output_track(&self) -> RecordingResult<AudioTrack> {
        self.output
            .clone()
            .ok_or_else(|| RecordingError::MixGraph("output track requested after dispose".into()))
    }

    pub fn report(&self) -> MixReport {
        self.report
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Release the processing task and end the output track
    pub async fn dispose(&mut self) -> RecordingResult<()> {
        let task = self
            .task
            .take()
            .ok_or_else(|| RecordingError::MixGraph("mix graph already disposed".into()))?;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match task.await {
            Ok(quanta) => info!("Audio mix graph disposed after {} quanta", quanta),
            Err(e) => warn!("Mix task ended abnormally: {}", e),
        }

        if let Some(output) = self.output.take() {
            output.stop();
        }
        if let Some(guard) = self.guard.take() {
            guard.release();
        }

        Ok(())
    }
}

impl Drop for AudioMixGraph {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            warn!("Audio mix graph dropped without dispose; aborting mix task");
            task.abort();
        }
        if let Some(output) = &self.output {
            output.stop();
        }
    }
}

async fn run_mix_loop(
    mut mixer: AudioMixer,
    local: Option<Tap>,
    remote: Option<Tap>,
    output: AudioTrack,
    quantum: Duration,
    mut shutdown: oneshot::Receiver<()>,
) -> u64 {
    let (local_track, mut local_rx) = split_tap(local);
    let (remote_track, mut remote_rx) = split_tap(remote);

    let mut ticker = interval(quantum);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            result = recv_tap(&mut local_rx) => {
                handle_tap_event(&mut mixer, MixInput::Local, &mut local_rx, result);
            }
            result = recv_tap(&mut remote_rx) => {
                handle_tap_event(&mut mixer, MixInput::Remote, &mut remote_rx, result);
            }
            _ = ticker.tick() => {
                let mut muted = Vec::with_capacity(2);
                for (input, track, rx) in [
                    (MixInput::Local, &local_track, &mut local_rx),
                    (MixInput::Remote, &remote_track, &mut remote_rx),
                ] {
                    let Some(track) = track else { continue };
                    if !track.is_live() && mixer.is_connected(input) {
                        mixer.disconnect(input);
                        *rx = None;
                    } else if !track.is_enabled() {
                        muted.push(input);
                    }
                }
                output.push_frame(mixer.render_quantum(&muted));
            }
        }
    }

    mixer.quanta_rendered()
}

fn split_tap(tap: Option<Tap>) -> (Option<AudioTrack>, Option<broadcast::Receiver<AudioFrame>>) {
    match tap {
        Some(tap) => (Some(tap.track), tap.rx),
        None => (None, None),
    }
}

fn handle_tap_event(
    mixer: &mut AudioMixer,
    input: MixInput,
    rx: &mut Option<broadcast::Receiver<AudioFrame>>,
    result: Result<AudioFrame, RecvError>,
) {
    match result {
        Ok(frame) => mixer.buffer_frame(input, &frame),
        Err(RecvError::Lagged(skipped)) => {
            warn!("{:?} audio tap lagged, {} frames skipped", input, skipped);
        }
        Err(RecvError::Closed) => {
            mixer.disconnect(input);
            *rx = None;
        }
    }
}
