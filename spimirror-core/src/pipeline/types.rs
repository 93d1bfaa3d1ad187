//! Frame types shared between pipeline stages.
//!
//! [`SourceFrame`] is a borrowed view of whatever the capture backend
//! produced; [`TargetFrame`] is the fixed-size RGB565 grid the rest of
//! the pipeline works on.

use crate::error::{CaptureError, MirrorError};
use crate::pipeline::color::ChannelLayout;

/// Bytes per source pixel. The pipeline only reads 32-bit surfaces.
pub const SOURCE_BYTES_PER_PIXEL: usize = 4;

// ── CaptureRegion ────────────────────────────────────────────────

/// Rectangle of the host surface to snapshot, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    /// Region covering a whole `width × height` surface.
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Whether the region lies inside a `width × height` surface.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

// ── SourceFrame ──────────────────────────────────────────────────

/// A captured snapshot, borrowed from the frame source for one iteration.
///
/// The `data` buffer holds `height` rows of `stride` bytes each; the last
/// row may omit its trailing padding. Pixels are 32-bit words in host
/// byte order, with channel positions described by `layout`.
#[derive(Debug, Clone, Copy)]
pub struct SourceFrame<'a> {
    width: u32,
    height: u32,
    stride: u32,
    layout: ChannelLayout,
    data: &'a [u8],
}

impl<'a> SourceFrame<'a> {
    /// Wrap a raw buffer, checking that it really holds `width × height`
    /// pixels at the given stride.
    pub fn new(
        width: u32,
        height: u32,
        stride: u32,
        layout: ChannelLayout,
        data: &'a [u8],
    ) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::Failed(format!(
                "empty source frame {width}x{height}"
            )));
        }
        let row_bytes = width as usize * SOURCE_BYTES_PER_PIXEL;
        if (stride as usize) < row_bytes {
            return Err(CaptureError::Failed(format!(
                "stride {stride} shorter than row of {row_bytes} bytes"
            )));
        }
        let needed = stride as usize * (height as usize - 1) + row_bytes;
        if data.len() < needed {
            return Err(CaptureError::Failed(format!(
                "source buffer holds {} bytes, need {needed}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            layout,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row pitch in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Pixel bytes of row `y`, without padding.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride as usize;
        &self.data[start..start + self.width as usize * SOURCE_BYTES_PER_PIXEL]
    }

    /// The 32-bit pixel word at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        let off = x as usize * SOURCE_BYTES_PER_PIXEL;
        word_at(self.row(y), off)
    }
}

#[inline]
pub(crate) fn word_at(row: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes([row[off], row[off + 1], row[off + 2], row[off + 3]])
}

// ── DisplayGeometry ──────────────────────────────────────────────

/// Size of the target grid and where it sits in controller RAM.
///
/// Many small ST7789 panels expose a visible area narrower than the
/// 240×320 controller memory; `x_offset`/`y_offset` translate grid
/// coordinates into device coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGeometry {
    width: u16,
    height: u16,
    x_offset: u16,
    y_offset: u16,
}

impl DisplayGeometry {
    pub fn new(width: u16, height: u16) -> Result<Self, MirrorError> {
        Self::with_offset(width, height, 0, 0)
    }

    pub fn with_offset(
        width: u16,
        height: u16,
        x_offset: u16,
        y_offset: u16,
    ) -> Result<Self, MirrorError> {
        if width == 0 || height == 0 {
            return Err(MirrorError::InvalidGeometry("target grid must be non-empty"));
        }
        if x_offset.checked_add(width - 1).is_none() || y_offset.checked_add(height - 1).is_none() {
            return Err(MirrorError::InvalidGeometry(
                "panel offset pushes the grid past device coordinates",
            ));
        }
        Ok(Self {
            width,
            height,
            x_offset,
            y_offset,
        })
    }

    pub const fn width(&self) -> u16 {
        self.width
    }

    pub const fn height(&self) -> u16 {
        self.height
    }

    /// First device column of the grid.
    pub const fn x_offset(&self) -> u16 {
        self.x_offset
    }

    /// First device row of the grid.
    pub const fn y_offset(&self) -> u16 {
        self.y_offset
    }
}

impl Default for DisplayGeometry {
    /// 240×240 at the origin of controller RAM.
    fn default() -> Self {
        Self {
            width: 240,
            height: 240,
            x_offset: 0,
            y_offset: 0,
        }
    }
}

// ── TargetFrame ──────────────────────────────────────────────────

/// A fixed-size grid of RGB565 values already in wire byte order.
///
/// Row-major, `width` values per row. Allocated once and reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFrame {
    width: u16,
    height: u16,
    pixels: Vec<u16>,
}

impl TargetFrame {
    /// An all-zero (black) frame.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    /// A frame sized to `geometry`.
    pub fn for_geometry(geometry: &DisplayGeometry) -> Self {
        Self::new(geometry.width(), geometry.height())
    }

    /// Build a frame from existing row-major pixels.
    pub fn from_pixels(width: u16, height: u16, pixels: Vec<u16>) -> Result<Self, MirrorError> {
        if pixels.len() != width as usize * height as usize {
            return Err(MirrorError::InvalidGeometry(
                "pixel count does not match frame dimensions",
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn get(&self, x: u16, y: u16) -> u16 {
        self.pixels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u16, y: u16, value: u16) {
        let i = self.index(x, y);
        self.pixels[i] = value;
    }

    /// All values of row `y`.
    pub fn row(&self, y: u16) -> &[u16] {
        let start = y as usize * self.width as usize;
        &self.pixels[start..start + self.width as usize]
    }

    pub fn row_mut(&mut self, y: u16) -> &mut [u16] {
        let start = y as usize * self.width as usize;
        let w = self.width as usize;
        &mut self.pixels[start..start + w]
    }

    /// Columns `x0..=x1` of row `y`.
    pub fn row_span(&self, y: u16, x0: u16, x1: u16) -> &[u16] {
        &self.row(y)[x0 as usize..=x1 as usize]
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn fill(&mut self, value: u16) {
        self.pixels.fill(value);
    }

    /// Overwrite every pixel with `other`'s.
    ///
    /// # Panics
    ///
    /// Panics if the two frames differ in size.
    pub fn copy_from(&mut self, other: &TargetFrame) {
        assert_eq!(
            (self.width, self.height),
            (other.width, other.height),
            "frame size mismatch"
        );
        self.pixels.copy_from_slice(&other.pixels);
    }

    fn index(&self, x: u16, y: u16) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.width as usize + x as usize
    }
}

// ── Tests ────────────────────────────────────────────────────────
