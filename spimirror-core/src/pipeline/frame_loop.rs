//! The capture → convert → diff → transfer loop.
//!
//! One iteration:
//!
//! 1. [`FrameSource`] snapshots the capture region.
//! 2. [`Downsampler`] samples it onto the target grid as wire-order RGB565.
//! 3. [`DirtyRegionTracker`] bounds the pixels that differ from the panel.
//! 4. [`DisplayTransport`] writes that rectangle, and only on success the
//!    new frame becomes the baseline.
//!
//! Everything runs on the caller's thread. [`FrameLoop::run`] checks its
//! `CancellationToken` between iterations and while waiting to retry a
//! capture, never during a transfer.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::MirrorError;
use crate::pipeline::capture::FrameSource;
use crate::pipeline::color::{ChannelLayout, ColorConverter};
use crate::pipeline::delta::{DirtyRect, DirtyRegionTracker};
use crate::pipeline::downsample::Downsampler;
use crate::pipeline::stats::{FrameCounters, ThroughputMeter};
use crate::pipeline::transport::{DisplayController, DisplayTransport};
use crate::pipeline::types::{CaptureRegion, DisplayGeometry, TargetFrame};

/// Longest a retry wait sleeps before re-checking for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(10);

// ── TransportFailurePolicy ───────────────────────────────────────

/// What the loop assumes about the panel after a failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportFailurePolicy {
    /// Keep the old baseline; the next frame re-sends the same delta.
    #[default]
    RetryDelta,
    /// Treat the panel content as unknown and redraw the whole grid on
    /// the next frame. Covers rows that landed before the bus fault.
    FullRedraw,
}

// ── FrameLoopConfig ──────────────────────────────────────────────

/// Configuration for [`FrameLoop`].
#[derive(Debug, Clone)]
pub struct FrameLoopConfig {
    /// Target grid and panel offset.
    pub geometry: DisplayGeometry,
    /// Channel positions in captured words.
    pub layout: ChannelLayout,
    /// Part of the surface to mirror; `None` mirrors all of it.
    pub region: Option<CaptureRegion>,
    /// Upper bound on iterations per second; 0 runs flat out.
    pub max_fps: u32,
    /// Capture failures tolerated in a row before the run fails.
    pub capture_retries: u32,
    /// Pause between capture retries.
    pub capture_retry_delay: Duration,
    /// Baseline handling after a transport failure.
    pub on_transport_error: TransportFailurePolicy,
    /// Send the whole grid on the first iteration.
    pub full_redraw_on_start: bool,
    /// How often throughput is logged.
    pub stats_interval: Duration,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self {
            geometry: DisplayGeometry::default(),
            layout: ChannelLayout::XRGB8888,
            region: None,
            max_fps: 0,
            capture_retries: 0,
            capture_retry_delay: Duration::from_millis(500),
            on_transport_error: TransportFailurePolicy::RetryDelta,
            full_redraw_on_start: true,
            stats_interval: Duration::from_secs(1),
        }
    }
}

// ── StepOutcome ──────────────────────────────────────────────────

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing differed from the baseline; no bus traffic.
    Unchanged,
    /// `rect` reached the panel and is now part of the baseline.
    Transferred { rect: DirtyRect, bytes: usize },
    /// The bus failed while sending `rect`; the baseline was kept.
    Dropped { rect: DirtyRect },
    /// Stop was requested while waiting to retry a failed capture.
    /// Nothing was sent.
    Cancelled,
}

// ── FrameLoop ────────────────────────────────────────────────────

/// Owns both frame buffers and drives the pipeline.
pub struct FrameLoop<S, D> {
    source: S,
    transport: DisplayTransport<D>,
    downsampler: Downsampler,
    tracker: DirtyRegionTracker,
    current: TargetFrame,
    meter: ThroughputMeter,
    config: FrameLoopConfig,
    last_report: Instant,
}

impl<S: FrameSource, D: DisplayController> FrameLoop<S, D> {
    pub fn new(source: S, controller: D, config: FrameLoopConfig) -> Result<Self, MirrorError> {
        let geometry = config.geometry;
        if !config.layout.is_valid() {
            return Err(MirrorError::Config(format!(
                "channel shifts must be at most 24, got {:?}",
                config.layout
            )));
        }
        if let Some(region) = config.region {
            if region.width == 0 || region.height == 0 {
                return Err(MirrorError::InvalidGeometry("capture region must be non-empty"));
            }
        }

        let tracker = if config.full_redraw_on_start {
            DirtyRegionTracker::with_unknown_baseline(geometry)
        } else {
            DirtyRegionTracker::new(geometry)
        };

        Ok(Self {
            source,
            transport: DisplayTransport::new(controller, geometry),
            downsampler: Downsampler::new(
                geometry.width(),
                geometry.height(),
                ColorConverter::new(config.layout),
            ),
            tracker,
            current: TargetFrame::for_geometry(&geometry),
            meter: ThroughputMeter::new(),
            config,
            last_report: Instant::now(),
        })
    }

    /// Bring the panel up. Failure here is fatal for the run.
    pub fn initialize_display(&mut self) -> Result<(), MirrorError> {
        self.transport
            .controller_mut()
            .initialize()
            .map_err(|e| MirrorError::Initialization(format!("display bring-up failed: {e}")))?;
        info!(
            "display initialised: {}x{} grid",
            self.transport.geometry().width(),
            self.transport.geometry().height()
        );
        Ok(())
    }

    /// Run iterations until `token` is cancelled or capture fails.
    pub fn run(&mut self, token: &CancellationToken) -> Result<(), MirrorError> {
        let interval = (self.config.max_fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / self.config.max_fps as f64));
        info!("frame loop started");

        while !token.is_cancelled() {
            let started = Instant::now();
            if self.iterate(Some(token))? == StepOutcome::Cancelled {
                break;
            }
            if let Some(interval) = interval {
                Self::pace(started, interval);
            }
        }

        let c = self.meter.counters();
        info!(
            "frame loop stopped: {} transferred, {} unchanged, {} dropped, {} bytes",
            c.transferred, c.unchanged, c.dropped, c.bytes
        );
        Ok(())
    }

    /// Run exactly one iteration.
    pub fn step(&mut self) -> Result<StepOutcome, MirrorError> {
        self.iterate(None)
    }

    /// Force the next iteration to redraw the whole grid.
    pub fn invalidate(&mut self) {
        self.tracker.invalidate();
    }

    pub fn counters(&self) -> FrameCounters {
        self.meter.counters()
    }

    /// The frame built by the latest iteration.
    pub fn current(&self) -> &TargetFrame {
        &self.current
    }

    /// What the panel is believed to show.
    pub fn previous(&self) -> &TargetFrame {
        self.tracker.previous()
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn controller(&self) -> &D {
        self.transport.controller()
    }

    pub fn controller_mut(&mut self) -> &mut D {
        self.transport.controller_mut()
    }

    // ── Internal ─────────────────────────────────────────────────

    fn iterate(&mut self, token: Option<&CancellationToken>) -> Result<StepOutcome, MirrorError> {
        if !self.capture_into_current(token)? {
            return Ok(StepOutcome::Cancelled);
        }

        let outcome = match self.tracker.detect(&self.current) {
            None => {
                self.meter.record_unchanged();
                StepOutcome::Unchanged
            }
            Some(rect) => match self.transport.transfer(&rect, &self.current) {
                Ok(bytes) => {
                    self.tracker.commit(&self.current);
                    self.meter.record_transfer(bytes);
                    StepOutcome::Transferred { rect, bytes }
                }
                Err(e) => {
                    warn!("dropped frame {rect}: {e}");
                    if self.config.on_transport_error == TransportFailurePolicy::FullRedraw {
                        self.tracker.invalidate();
                    }
                    self.meter.record_dropped();
                    StepOutcome::Dropped { rect }
                }
            },
        };

        self.report();
        Ok(outcome)
    }

    /// Capture and convert into `current`. Returns `false` if `token`
    /// was cancelled while waiting to retry.
    fn capture_into_current(
        &mut self,
        token: Option<&CancellationToken>,
    ) -> Result<bool, MirrorError> {
        let region = match self.config.region {
            Some(region) => region,
            None => {
                let (w, h) = self.source.surface_size();
                CaptureRegion::full(w, h)
            }
        };

        let mut failures = 0;
        loop {
            match self.source.capture(region) {
                Ok(frame) => {
                    self.downsampler.process(&frame, &mut self.current)?;
                    return Ok(true);
                }
                Err(e) if failures < self.config.capture_retries => {
                    failures += 1;
                    warn!(
                        "capture failed ({failures}/{}): {e}; retrying",
                        self.config.capture_retries
                    );
                    if !Self::wait(token, self.config.capture_retry_delay) {
                        info!("stop requested during capture retry");
                        return Ok(false);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Sleep for `delay`, waking early if `token` is cancelled.
    /// Returns `false` on cancellation.
    fn wait(token: Option<&CancellationToken>, delay: Duration) -> bool {
        let Some(token) = token else {
            std::thread::sleep(delay);
            return true;
        };
        let deadline = Instant::now() + delay;
        loop {
            if token.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }

    fn report(&mut self) {
        if self.last_report.elapsed() < self.config.stats_interval {
            return;
        }
        let now = Instant::now();
        self.last_report = now;
        self.meter.expire(now);
        let c = self.meter.counters();
        debug!(
            "{:.1} fps, {} B/s, {} dropped so far",
            self.meter.frames_per_second(),
            self.meter.bytes_per_second(),
            c.dropped
        );
    }

    /// Sleep for the remainder of the frame interval.
    fn pace(started: Instant, interval: Duration) {
        let elapsed = started.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
}
