//! Nearest-neighbor downsampling onto the fixed target grid.
//!
//! Target `(x, y)` reads source `(x * Ws / Wt, y * Hs / Ht)` with floor
//! division. The column and row indices never change while the source
//! size stays the same, so [`SampleGrid`] computes them once and the
//! per-frame pass is two table lookups per pixel.

use crate::error::MirrorError;
use crate::pipeline::color::ColorConverter;
use crate::pipeline::types::{SOURCE_BYTES_PER_PIXEL, SourceFrame, TargetFrame, word_at};

/// Source coordinate sampled for target `(x, y)`.
///
/// Source and target sizes must be non-zero.
#[inline]
pub fn source_coord(x: u32, y: u32, source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    (scale(x, source.0, target.0), scale(y, source.1, target.1))
}

#[inline]
fn scale(i: u32, source: u32, target: u32) -> u32 {
    (i as u64 * source as u64 / target as u64) as u32
}

// ── SampleGrid ───────────────────────────────────────────────────

/// Precomputed sampling tables for one `(source, target)` size pair.
#[derive(Debug, Clone)]
pub struct SampleGrid {
    source_width: u32,
    source_height: u32,
    /// Byte offset within a source row for each target column.
    col_offsets: Vec<usize>,
    /// Source row index for each target row.
    rows: Vec<u32>,
}

impl SampleGrid {
    pub fn new(
        source_width: u32,
        source_height: u32,
        target_width: u16,
        target_height: u16,
    ) -> Result<Self, MirrorError> {
        if source_width == 0 || source_height == 0 {
            return Err(MirrorError::InvalidGeometry("source frame must be non-empty"));
        }
        if target_width == 0 || target_height == 0 {
            return Err(MirrorError::InvalidGeometry("target grid must be non-empty"));
        }
        let tw = target_width as u32;
        let th = target_height as u32;
        let col_offsets = (0..tw)
            .map(|x| scale(x, source_width, tw) as usize * SOURCE_BYTES_PER_PIXEL)
            .collect();
        let rows = (0..th).map(|y| scale(y, source_height, th)).collect();
        Ok(Self {
            source_width,
            source_height,
            col_offsets,
            rows,
        })
    }

    /// Whether this grid was built for a source of the given size.
    pub fn matches(&self, source_width: u32, source_height: u32) -> bool {
        self.source_width == source_width && self.source_height == source_height
    }

    pub fn target_width(&self) -> u16 {
        self.col_offsets.len() as u16
    }

    pub fn target_height(&self) -> u16 {
        self.rows.len() as u16
    }

    /// Sampled source column for target column `x`.
    pub fn source_column(&self, x: u16) -> u32 {
        (self.col_offsets[x as usize] / SOURCE_BYTES_PER_PIXEL) as u32
    }

    /// Sampled source row for target row `y`.
    pub fn source_row(&self, y: u16) -> u32 {
        self.rows[y as usize]
    }

    /// Downsample and convert `source` into every pixel of `target`.
    ///
    /// # Panics
    ///
    /// Panics if `source` or `target` does not match the sizes this grid
    /// was built for.
    pub fn resample(
        &self,
        source: &SourceFrame<'_>,
        converter: &ColorConverter,
        target: &mut TargetFrame,
    ) {
        assert!(self.matches(source.width(), source.height()), "source size changed");
        assert_eq!(
            (target.width(), target.height()),
            (self.target_width(), self.target_height()),
            "target size mismatch"
        );

        for (y, &sy) in self.rows.iter().enumerate() {
            let line = source.row(sy);
            let out = target.row_mut(y as u16);
            for (dst, &off) in out.iter_mut().zip(&self.col_offsets) {
                *dst = converter.convert(word_at(line, off));
            }
        }
    }
}

// ── Downsampler ──────────────────────────────────────────────────

/// Keeps a [`SampleGrid`] for the current source size and rebuilds it
/// when the captured surface changes size.
#[derive(Debug, Clone)]
pub struct Downsampler {
    target_width: u16,
    target_height: u16,
    converter: ColorConverter,
    grid: Option<SampleGrid>,
}

impl Downsampler {
    pub fn new(target_width: u16, target_height: u16, converter: ColorConverter) -> Self {
        Self {
            target_width,
            target_height,
            converter,
            grid: None,
        }
    }

    /// Downsample + convert `source` into `target`.
    pub fn process(
        &mut self,
        source: &SourceFrame<'_>,
        target: &mut TargetFrame,
    ) -> Result<(), MirrorError> {
        let stale = !self
            .grid
            .as_ref()
            .is_some_and(|g| g.matches(source.width(), source.height()));
        if stale {
            tracing::debug!(
                "sampling {}x{} source onto {}x{} grid",
                source.width(),
                source.height(),
                self.target_width,
                self.target_height
            );
            self.grid = Some(SampleGrid::new(
                source.width(),
                source.height(),
                self.target_width,
                self.target_height,
            )?);
        }
        if let Some(grid) = &self.grid {
            grid.resample(source, &self.converter, target);
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::color::{ChannelLayout, from_wire, rgb565};
    use proptest::prelude::*;

    /// Source where every pixel encodes its own coordinates: R = x, B = y.
    fn coordinate_source(w: u32, h: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                let word = ((x & 0xFF) << 16) | (y & 0xFF);
                data.extend_from_slice(&word.to_ne_bytes());
            }
        }
        data
    }

    #[test]
    fn identity_when_sizes_match() {
        for x in 0..10 {
            assert_eq!(source_coord(x, x, (10, 10), (10, 10)), (x, x));
        }
    }

    #[test]
    fn halving_picks_even_columns() {
        let grid = SampleGrid::new(480, 480, 240, 240).unwrap();
        assert_eq!(grid.source_column(0), 0);
        assert_eq!(grid.source_column(1), 2);
        assert_eq!(grid.source_row(239), 478);
    }

    #[test]
    fn tiny_source_upsamples() {
        // 2x1 source onto 4x2: each source pixel repeated.
        let grid = SampleGrid::new(2, 1, 4, 2).unwrap();
        let cols: Vec<u32> = (0..4).map(|x| grid.source_column(x)).collect();
        assert_eq!(cols, vec![0, 0, 1, 1]);
        assert_eq!((grid.source_row(0), grid.source_row(1)), (0, 0));
    }

    #[test]
    fn rejects_empty_geometry() {
        assert!(SampleGrid::new(0, 10, 4, 4).is_err());
        assert!(SampleGrid::new(10, 10, 0, 4).is_err());
    }

    #[test]
    fn resample_reads_sampled_pixels() {
        let (w, h) = (20, 10);
        let data = coordinate_source(w, h);
        let frame = SourceFrame::new(w, h, w * 4, ChannelLayout::XRGB8888, &data).unwrap();
        let mut ds = Downsampler::new(5, 5, ColorConverter::new(ChannelLayout::XRGB8888));
        let mut target = TargetFrame::new(5, 5);
        ds.process(&frame, &mut target).unwrap();

        // Target (3, 4) samples source (12, 8).
        assert_eq!(from_wire(target.get(3, 4)), rgb565(12, 0, 8));
    }

    #[test]
    fn grid_rebuilt_on_source_resize() {
        let mut ds = Downsampler::new(2, 2, ColorConverter::default());
        let mut target = TargetFrame::new(2, 2);

        let small = coordinate_source(2, 2);
        let frame = SourceFrame::new(2, 2, 8, ChannelLayout::XRGB8888, &small).unwrap();
        ds.process(&frame, &mut target).unwrap();

        let big = coordinate_source(64, 64);
        let frame = SourceFrame::new(64, 64, 256, ChannelLayout::XRGB8888, &big).unwrap();
        ds.process(&frame, &mut target).unwrap();
        // (1, 1) now samples source (32, 32).
        assert_eq!(from_wire(target.get(1, 1)), rgb565(32, 0, 32));
    }

    proptest! {
        #[test]
        fn sampled_coordinates_are_floor_scaled(
            ws in 1u32..4000,
            hs in 1u32..4000,
            wt in 1u16..400,
            ht in 1u16..400,
        ) {
            let grid = SampleGrid::new(ws, hs, wt, ht).unwrap();
            for x in 0..wt {
                let expected = (x as u64 * ws as u64 / wt as u64) as u32;
                prop_assert_eq!(grid.source_column(x), expected);
                prop_assert!(expected < ws);
            }
            for y in 0..ht {
                let expected = (y as u64 * hs as u64 / ht as u64) as u32;
                prop_assert_eq!(grid.source_row(y), expected);
                prop_assert_eq!(
                    source_coord(0, y as u32, (ws, hs), (wt as u32, ht as u32)).1,
                    expected
                );
            }
        }
    }
}
