use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::surface::{CompositeLayout, CompositeSurface, INSET_BORDER_RGBA, PLACEHOLDER_RGBA};
use crate::error::{RecordingError, RecordingResult};
use crate::media::{MediaStreamHandle, VideoFrame, VideoTrack};
use crate::resources::{ResourceGuard, ResourceKind, ResourceLedger};

/// Configuration for the composite surface
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    pub width: u32,
    pub height: u32,
    /// Redraws per second (display refresh)
    pub refresh_hz: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            refresh_hz: 60,
        }
    }
}

/// Source of redraw ticks
///
/// On a display this is the vsync callback; headless it is a fixed-rate timer.
#[async_trait::async_trait]
pub trait RedrawScheduler: Send {
    /// Wait for the next redraw opportunity
    async fn tick(&mut self);
}

/// Fixed-rate scheduler; late ticks are skipped rather than bunched
pub struct IntervalScheduler {
    interval: Interval,
}

impl IntervalScheduler {
    pub fn new(refresh_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / refresh_hz.max(1) as f64);
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait::async_trait]
impl RedrawScheduler for IntervalScheduler {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Redraws remote (full-bleed) and local (mirrored inset) into one synthetic track
pub struct FrameCompositor {
    output: VideoTrack,
    layout: CompositeLayout,
    frames_drawn: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    guard: Option<ResourceGuard>,
}

impl FrameCompositor {
    /// Start a redraw loop at `config.refresh_hz`
    pub fn start(
        local: &MediaStreamHandle,
        remote: &MediaStreamHandle,
        config: &CompositorConfig,
        ledger: &ResourceLedger,
    ) -> RecordingResult<Self> {
        let scheduler = Box::new(IntervalScheduler::new(config.refresh_hz));
        Self::start_with_scheduler(local, remote, config, scheduler, ledger)
    }

    pub fn start_with_scheduler(
        local: &MediaStreamHandle,
        remote: &MediaStreamHandle,
        config: &CompositorConfig,
        scheduler: Box<dyn RedrawScheduler>,
        ledger: &ResourceLedger,
    ) -> RecordingResult<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(RecordingError::Compositor(format!(
                "canvas must not be empty ({}x{})",
                config.width, config.height
            )));
        }

        let layout = CompositeLayout::for_canvas(config.width, config.height);
        let output = VideoTrack::new("composite-video");
        let frames_drawn = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let painter = Painter {
            surface: CompositeSurface::new(config.width, config.height),
            layout,
            local: local.video().cloned(),
            remote: remote.video().cloned(),
            last_remote: None,
            frozen: false,
        };

        info!(
            "Frame compositor started: {}x{} @ {}Hz (remote video={}, local video={})",
            config.width,
            config.height,
            config.refresh_hz,
            painter.remote.is_some(),
            painter.local.is_some()
        );

        let task = tokio::spawn(run_redraw_loop(
            painter,
            scheduler,
            output.clone(),
            Arc::clone(&frames_drawn),
            shutdown_rx,
        ));

        Ok(Self {
            output,
            layout,
            frames_drawn,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            guard: Some(ledger.acquire(ResourceKind::RedrawLoop)),
        })
    }

    /// The synthetic track carrying composite frames
    pub fn output_track(&self) -> VideoTrack {
        self.output.clone()
    }

    pub fn layout(&self) -> CompositeLayout {
        self.layout
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Cancel the redraw loop. Once this returns no further frames are drawn.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = task.await {
            warn!("Redraw loop ended abnormally: {}", e);
        }

        self.output.stop();
        if let Some(guard) = self.guard.take() {
            guard.release();
        }

        info!("Frame compositor stopped after {} frames", self.frames_drawn());
    }
}

impl Drop for FrameCompositor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            warn!("Frame compositor dropped while running; aborting redraw loop");
            task.abort();
            self.output.stop();
        }
    }
}

/// State owned exclusively by the redraw loop
struct Painter {
    surface: CompositeSurface,
    layout: CompositeLayout,
    local: Option<VideoTrack>,
    remote: Option<VideoTrack>,
    /// Last remote frame drawn, reused when the remote source goes away
    last_remote: Option<Arc<VideoFrame>>,
    frozen: bool,
}

impl Painter {
    fn draw(&mut self, timestamp_ms: u64) -> VideoFrame {
        self.draw_background();
        self.draw_inset();
        self.surface.snapshot(timestamp_ms)
    }

    fn draw_background(&mut self) {
        let canvas = self.layout.canvas;

        let Some(remote) = &self.remote else {
            self.surface.fill(PLACEHOLDER_RGBA);
            return;
        };

        if !remote.is_live() {
            // Peer went away: hold the last good picture
            if !self.frozen {
                warn!("Remote video source ended; holding last frame");
                self.frozen = true;
            }
            match &self.last_remote {
                Some(frame) => self.surface.draw_scaled(frame, canvas, false),
                None => self.surface.fill(PLACEHOLDER_RGBA),
            }
            return;
        }

        if !remote.is_enabled() {
            self.surface.fill(PLACEHOLDER_RGBA);
            return;
        }

        match remote.current_frame() {
            Some(frame) => {
                self.surface.draw_scaled(&frame, canvas, false);
                self.last_remote = Some(frame);
            }
            None => match &self.last_remote {
                Some(frame) => self.surface.draw_scaled(frame, canvas, false),
                None => self.surface.fill(PLACEHOLDER_RGBA),
            },
        }
    }

    fn draw_inset(&mut self) {
        let Some(local) = &self.local else {
            return;
        };
        if !local.is_enabled() {
            return;
        }
        let Some(frame) = local.current_frame() else {
            return;
        };

        let inset = self.layout.inset;
        self.surface
            .stroke_outside(inset, self.layout.border_width, INSET_BORDER_RGBA);
        self.surface.draw_scaled(&frame, inset, true);
    }
}

async fn run_redraw_loop(
    mut painter: Painter,
    mut scheduler: Box<dyn RedrawScheduler>,
    output: VideoTrack,
    frames_drawn: Arc<AtomicU64>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let started = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = scheduler.tick() => {
                let timestamp_ms = started.elapsed().as_millis() as u64;
                let job = tokio::task::spawn_blocking(move || {
                    let frame = painter.draw(timestamp_ms);
                    (painter, frame)
                });
                let (returned, frame) = match job.await {
                    Ok(done) => done,
                    Err(e) => {
                        error!("Redraw task failed, compositor halted: {}", e);
                        break;
                    }
                };
                painter = returned;
                output.push_frame(frame);
                frames_drawn.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    debug!("Redraw loop exited");
}
