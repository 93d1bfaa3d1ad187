//! # Mirror pipeline
//!
//! Per-frame path from the host desktop to the panel:
//!
//! ```text
//! FrameSource::capture
//!   ↓  SourceFrame (borrowed, 32-bit pixels, any size)
//! Downsampler + ColorConverter
//!   ↓  TargetFrame "current" (W×H wire-order RGB565)
//! DirtyRegionTracker::detect  ←── TargetFrame "previous"
//!   ↓  Option<DirtyRect>
//! DisplayTransport::transfer
//!   ↓  set_window + one write per row
//! DisplayController
//! ```
//!
//! ## Sub-modules
//!
//! | Module       | Purpose                                              |
//! |------------- |------------------------------------------------------|
//! | `types`      | Frame buffers, capture region, panel geometry        |
//! | `capture`    | `FrameSource` trait and an in-memory source          |
//! | `downsample` | Nearest-neighbor sampling onto the target grid       |
//! | `color`      | 32-bit → RGB565 conversion and wire byte order        |
//! | `delta`      | Dirty bounding box and the baseline tracker          |
//! | `transport`  | `DisplayController` trait and windowed row transfer  |
//! | `stats`      | Rolling throughput and outcome counters              |
//! | `frame_loop` | The orchestrating loop                               |

pub mod capture;
pub mod color;
pub mod delta;
pub mod downsample;
pub mod frame_loop;
pub mod stats;
pub mod transport;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use capture::{FrameSource, MemoryFrameSource};
pub use color::{ChannelLayout, ColorConverter};
pub use delta::{DirtyRect, DirtyRegionTracker};
pub use downsample::{Downsampler, SampleGrid};
pub use frame_loop::{FrameLoop, FrameLoopConfig, StepOutcome, TransportFailurePolicy};
pub use stats::{FrameCounters, ThroughputMeter};
pub use transport::{DisplayController, DisplayTransport};
pub use types::{CaptureRegion, DisplayGeometry, SourceFrame, TargetFrame};
