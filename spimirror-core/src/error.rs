//! Error types for the mirror pipeline.
//!
//! Fallible pipeline operations return `Result<T, MirrorError>`.
//! Stage-level failures have their own enums ([`CaptureError`],
//! [`TransportError`]) so the frame loop can apply a different policy
//! to each: capture failures end the run, transport failures drop the
//! frame.

use thiserror::Error;

/// The canonical error type for the mirror pipeline.
#[derive(Debug, Error)]
pub enum MirrorError {
    // ── Setup Errors ─────────────────────────────────────────────
    /// The bus, the pins or the capture session could not be brought up.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// Source or target dimensions violate a precondition.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),

    /// A configuration value is out of range or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    // ── Pipeline Errors ──────────────────────────────────────────
    /// The frame source failed.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// The display bus failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An OS-level I/O error outside the pipeline stages.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// ── CaptureError ─────────────────────────────────────────────────

/// Failure to obtain a snapshot from the host display surface.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The display session is gone or was never reachable.
    #[error("capture surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// The requested region does not fit inside the surface.
    #[error("capture region {width}x{height}+{x}+{y} exceeds surface {surface_width}x{surface_height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        surface_width: u32,
        surface_height: u32,
    },

    /// The surface delivered pixels the pipeline cannot read.
    #[error("unsupported pixel format: {bits_per_pixel} bits per pixel")]
    UnsupportedFormat { bits_per_pixel: u32 },

    /// Any other capture backend failure.
    #[error("capture failed: {0}")]
    Failed(String),
}

// ── TransportError ───────────────────────────────────────────────

/// Failure while talking to the display controller.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The SPI bus reported a fault.
    #[error("bus write failed: {0}")]
    Bus(String),

    /// A control pin (data/command, reset, backlight) could not be driven.
    #[error("pin error: {0}")]
    Pin(String),

    /// The requested window is not inside the target grid.
    #[error("window ({x0},{y0})-({x1},{y1}) outside {width}x{height} grid")]
    WindowOutOfBounds {
        x0: u16,
        y0: u16,
        x1: u16,
        y1: u16,
        width: u16,
        height: u16,
    },
}
