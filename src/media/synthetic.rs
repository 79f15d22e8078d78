// Synthetic media sources
//
// Stand-ins for a camera, microphone or remote peer when no real device is
// wired in: a solid background with a sweeping bar for video and a sine tone
// for audio. Generators run until their track is stopped.

use anyhow::{bail, Result};
use std::f32::consts::TAU;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use super::acquirer::{MediaConstraints, MediaDevices};
use super::track::{AudioFrame, AudioTrack, MediaStreamHandle, VideoFrame, VideoTrack};

/// Shape of a synthetic participant
#[derive(Debug, Clone)]
pub struct SyntheticPattern {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Background colour (RGB)
    pub color: [u8; 3],
    pub tone_hz: f32,
    pub amplitude: i16,
    pub sample_rate: u32,
    pub channels: u16,
    /// Length of each audio frame
    pub frame_duration: Duration,
}

impl Default for SyntheticPattern {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            fps: 30,
            color: [0x33, 0x66, 0x99],
            tone_hz: 440.0,
            amplitude: 4000,
            sample_rate: 48000,
            channels: 1,
            frame_duration: Duration::from_millis(20),
        }
    }
}

impl SyntheticPattern {
    /// Pattern for the remote party: different colour and pitch
    pub fn peer() -> Self {
        Self {
            color: [0x99, 0x33, 0x66],
            tone_hz: 220.0,
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub(crate) fn render_frame(&self, index: u64, timestamp_ms: u64) -> VideoFrame {
        let [r, g, b] = self.color;
        let mut frame = VideoFrame::solid(self.width, self.height, [r, g, b, 255], timestamp_ms);

        // Vertical bar sweeping left to right, one column per frame
        let bar_width = (self.width / 16).max(1);
        let bar_x = (index % self.width as u64) as u32;
        for y in 0..self.height {
            for dx in 0..bar_width {
                let x = (bar_x + dx) % self.width;
                let offset = ((y * self.width + x) * 4) as usize;
                frame.data[offset..offset + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }

        frame
    }

    fn samples_per_frame(&self) -> usize {
        let per_channel = self.sample_rate as u128 * self.frame_duration.as_millis() / 1000;
        per_channel as usize * self.channels as usize
    }
}

/// Open a stream whose tracks are fed by synthetic generators
pub fn synthetic_stream(id: &str, pattern: &SyntheticPattern, constraints: &MediaConstraints) -> MediaStreamHandle {
    let video = constraints.video.then(|| {
        let track = VideoTrack::new(&format!("{}-video", id));
        spawn_video_generator(track.clone(), pattern.clone());
        track
    });
    let audio = constraints.audio.then(|| {
        let track = AudioTrack::new(&format!("{}-audio", id));
        spawn_audio_generator(track.clone(), pattern.clone());
        track
    });

    MediaStreamHandle::new(id, video, audio)
}

pub fn spawn_video_generator(track: VideoTrack, pattern: SyntheticPattern) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs_f64(1.0 / pattern.fps.max(1) as f64);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut index = 0u64;

        loop {
            ticker.tick().await;
            let timestamp_ms = (period * index as u32).as_millis() as u64;
            if !track.push_frame(pattern.render_frame(index, timestamp_ms)) {
                break;
            }
            index += 1;
        }

        debug!("Synthetic video generator for {} stopped after {} frames", track.label(), index);
    })
}

pub fn spawn_audio_generator(track: AudioTrack, pattern: SyntheticPattern) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(pattern.frame_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let samples_per_frame = pattern.samples_per_frame();
        let channels = pattern.channels.max(1) as usize;
        let step = TAU * pattern.tone_hz / pattern.sample_rate as f32;
        let mut phase = 0.0f32;
        let mut index = 0u64;

        loop {
            ticker.tick().await;

            let mut samples = Vec::with_capacity(samples_per_frame);
            for _ in 0..samples_per_frame / channels {
                let value = (phase.sin() * pattern.amplitude as f32) as i16;
                for _ in 0..channels {
                    samples.push(value);
                }
                phase = (phase + step) % TAU;
            }

            let frame = AudioFrame {
                samples,
                sample_rate: pattern.sample_rate,
                channels: pattern.channels,
                timestamp_ms: index * pattern.frame_duration.as_millis() as u64,
            };
            if !track.push_frame(frame) {
                break;
            }
            index += 1;
        }

        debug!("Synthetic audio generator for {} stopped after {} frames", track.label(), index);
    })
}

/// Device provider backed by synthetic generators
pub struct SyntheticDevices {
    pattern: SyntheticPattern,
    deny: bool,
}

impl SyntheticDevices {
    pub fn new(pattern: SyntheticPattern) -> Self {
        Self { pattern, deny: false }
    }

    /// Provider that refuses access, as if the user denied the permission prompt
    pub fn denied() -> Self {
        Self {
            pattern: SyntheticPattern::default(),
            deny: true,
        }
    }
}

#[async_trait::async_trait]
impl MediaDevices for SyntheticDevices {
    async fn open(&self, constraints: &MediaConstraints) -> Result<MediaStreamHandle> {
        if self.deny {
            bail!("permission to use camera and microphone was denied");
        }
        if !constraints.video && !constraints.audio {
            bail!("at least one of video or audio must be requested");
        }
        Ok(synthetic_stream("local", &self.pattern, constraints))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
