//! Mirror service core logic.
//!
//! Builds the capture backend and the panel from [`MirrorConfig`] and
//! runs the frame loop on a blocking thread until stopped.

use tracing::{error, info};

use spimirror_core::{
    CancellationToken, DisplayController, FrameLoop, FrameLoopConfig, FrameSource, MirrorError,
};

use crate::capture::{TestPattern, X11Capturer};
use crate::config::{CaptureBackend, MirrorConfig};
use crate::hardware;

// ── MirrorService ────────────────────────────────────────────────

/// The top-level mirror service.
pub struct MirrorService {
    config: MirrorConfig,
    stop: CancellationToken,
}

impl MirrorService {
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            stop: CancellationToken::new(),
        }
    }

    /// Obtain a handle that stops the service from another task.
    ///
    /// The loop finishes the iteration in progress before exiting.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Run the service until stopped or a fatal error occurs.
    ///
    /// 1. Validates the configuration.
    /// 2. Opens the panel and the capture backend.
    /// 3. Brings the panel up.
    /// 4. Mirrors frames until the stop handle is cancelled.
    pub async fn run(&self) -> Result<(), MirrorError> {
        let config = self.config.clone();
        let stop = self.stop.clone();

        let result = tokio::task::spawn_blocking(move || run_blocking(&config, &stop))
            .await
            .map_err(|e| MirrorError::Initialization(format!("frame loop thread failed: {e}")))?;

        match &result {
            Ok(()) => info!("mirror service stopped"),
            Err(e) => error!("mirror service failed: {e}"),
        }
        result
    }
}

// ── Internal ─────────────────────────────────────────────────────

fn run_blocking(config: &MirrorConfig, stop: &CancellationToken) -> Result<(), MirrorError> {
    let loop_config = config.to_loop_config()?;
    let controller = hardware::open_controller(config)?;

    match config.capture.backend {
        CaptureBackend::X11 => {
            let display = Some(config.capture.display.as_str());
            let source = X11Capturer::connect(display, loop_config.layout)
                .map_err(|e| MirrorError::Initialization(e.to_string()))?;
            mirror(source, controller, loop_config, stop)
        }
        CaptureBackend::TestPattern => {
            let g = loop_config.geometry;
            let source = TestPattern::new(u32::from(g.width()), u32::from(g.height()));
            mirror(source, controller, loop_config, stop)
        }
    }
}

fn mirror<S: FrameSource, D: DisplayController>(
    source: S,
    controller: D,
    config: FrameLoopConfig,
    stop: &CancellationToken,
) -> Result<(), MirrorError> {
    let mut frame_loop = FrameLoop::new(source, controller, config)?;
    frame_loop.initialize_display()?;
    frame_loop.run(stop)
}

// ── Tests ────────────────────────────────────────────────────────
