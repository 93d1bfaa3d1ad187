//! Frame source abstraction.
//!
//! Capture backends live outside this crate (the `spimirror` binary ships
//! an X11 one). The pipeline only needs a borrowed snapshot per
//! iteration, so backends can keep reusing one buffer.

use crate::error::CaptureError;
use crate::pipeline::color::ChannelLayout;
use crate::pipeline::types::{CaptureRegion, SOURCE_BYTES_PER_PIXEL, SourceFrame};

/// Produces snapshots of the host display surface.
pub trait FrameSource {
    /// Full surface size in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Snapshot `region` of the surface.
    ///
    /// The returned frame borrows the source until the next call.
    fn capture(&mut self, region: CaptureRegion) -> Result<SourceFrame<'_>, CaptureError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn surface_size(&self) -> (u32, u32) {
        (**self).surface_size()
    }

    fn capture(&mut self, region: CaptureRegion) -> Result<SourceFrame<'_>, CaptureError> {
        (**self).capture(region)
    }
}

/// Borrow `region` out of a full-surface buffer without copying.
pub fn crop<'a>(
    data: &'a [u8],
    surface: (u32, u32),
    stride: u32,
    layout: ChannelLayout,
    region: CaptureRegion,
) -> Result<SourceFrame<'a>, CaptureError> {
    if !region.fits_within(surface.0, surface.1) {
        return Err(CaptureError::RegionOutOfBounds {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            surface_width: surface.0,
            surface_height: surface.1,
        });
    }
    let start = region.y as usize * stride as usize + region.x as usize * SOURCE_BYTES_PER_PIXEL;
    let tail = data.get(start..).ok_or_else(|| {
        CaptureError::Failed(format!("surface buffer too short for region at offset {start}"))
    })?;
    SourceFrame::new(region.width, region.height, stride, layout, tail)
}

// ── MemoryFrameSource ────────────────────────────────────────────

/// A frame source backed by an in-memory surface.
///
/// Used for test patterns and for driving the loop in tests.
#[derive(Debug, Clone)]
pub struct MemoryFrameSource {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    pixels: Vec<u32>,
}

impl MemoryFrameSource {
    /// A black surface.
    pub fn new(width: u32, height: u32, layout: ChannelLayout) -> Self {
        Self {
            width,
            height,
            layout,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn fill(&mut self, word: u32) {
        self.pixels.fill(word);
    }

    /// Set the pixel word at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn set(&mut self, x: u32, y: u32, word: u32) {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        self.pixels[y as usize * self.width as usize + x as usize] = word;
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }
}

impl FrameSource for MemoryFrameSource {
    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self, region: CaptureRegion) -> Result<SourceFrame<'_>, CaptureError> {
        let stride = self.width * SOURCE_BYTES_PER_PIXEL as u32;
        crop(
            bytemuck::cast_slice(self.pixels.as_slice()),
            (self.width, self.height),
            stride,
            self.layout,
            region,
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────
