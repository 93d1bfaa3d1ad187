//! # spimirror-core
//!
//! Frame pipeline for mirroring a desktop onto a small SPI display.
//!
//! This crate contains:
//! - **Pipeline**: capture → downsample → RGB565 → dirty rectangle →
//!   windowed transfer, driven by [`FrameLoop`]
//! - **Seams**: [`FrameSource`] for capture backends and
//!   [`DisplayController`] for panels
//! - **Display**: an ST7789 driver generic over `embedded-hal` 1.0
//! - **Error**: [`MirrorError`], a `thiserror`-based error hierarchy

pub mod display;
pub mod error;
pub mod pipeline;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use display::{PanelConfig, St7789};
pub use error::{CaptureError, MirrorError, TransportError};
pub use pipeline::{
    CaptureRegion, ChannelLayout, DirtyRect, DisplayController, DisplayGeometry, FrameLoop,
    FrameLoopConfig, FrameSource, MemoryFrameSource, SourceFrame, StepOutcome, TargetFrame,
    TransportFailurePolicy,
};

/// Re-exported so callers can share one cancellation type with the loop.
pub use tokio_util::sync::CancellationToken;
