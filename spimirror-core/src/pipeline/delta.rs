//! Dirty-region detection between consecutive target frames.
//!
//! Every pixel of the new frame is compared against the last frame that
//! reached the panel, and the changed pixels are summarised as a single
//! bounding rectangle. Diffing happens on the downsampled grid, never on
//! the full-resolution capture.

use crate::pipeline::types::{DisplayGeometry, TargetFrame};

// ── DirtyRect ────────────────────────────────────────────────────

/// Inclusive, non-empty rectangle in target-grid coordinates.
///
/// "Nothing changed" is represented as `None` by the functions that
/// produce rectangles; a `DirtyRect` value always covers at least one
/// pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirtyRect {
    x_min: u16,
    y_min: u16,
    x_max: u16,
    y_max: u16,
}

impl DirtyRect {
    /// `None` unless `x_min <= x_max` and `y_min <= y_max`.
    pub const fn new(x_min: u16, y_min: u16, x_max: u16, y_max: u16) -> Option<Self> {
        if x_min > x_max || y_min > y_max {
            return None;
        }
        Some(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    /// Rectangle covering a single pixel.
    pub const fn point(x: u16, y: u16) -> Self {
        Self {
            x_min: x,
            y_min: y,
            x_max: x,
            y_max: y,
        }
    }

    /// Rectangle covering the whole grid.
    pub const fn full(geometry: &DisplayGeometry) -> Self {
        Self {
            x_min: 0,
            y_min: 0,
            x_max: geometry.width() - 1,
            y_max: geometry.height() - 1,
        }
    }

    pub const fn x_min(&self) -> u16 {
        self.x_min
    }

    pub const fn y_min(&self) -> u16 {
        self.y_min
    }

    pub const fn x_max(&self) -> u16 {
        self.x_max
    }

    pub const fn y_max(&self) -> u16 {
        self.y_max
    }

    /// Columns per row.
    pub const fn width(&self) -> u16 {
        self.x_max - self.x_min + 1
    }

    /// Number of rows.
    pub const fn height(&self) -> u16 {
        self.y_max - self.y_min + 1
    }

    /// Pixels covered.
    pub const fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub const fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// Grow to include `(x, y)`.
    pub fn include(&mut self, x: u16, y: u16) {
        self.x_min = self.x_min.min(x);
        self.x_max = self.x_max.max(x);
        self.y_min = self.y_min.min(y);
        self.y_max = self.y_max.max(y);
    }

    /// Whether the rectangle lies inside a `width × height` grid.
    pub const fn fits_within(&self, width: u16, height: u16) -> bool {
        self.x_max < width && self.y_max < height
    }
}

impl std::fmt::Display for DirtyRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.x_min, self.y_min, self.x_max, self.y_max
        )
    }
}

/// Bounding box of every position where `previous` and `current` differ.
///
/// Rows are scanned top to bottom; within a changed row only the first
/// and last differing columns matter for the box.
///
/// # Panics
///
/// Panics if the frames differ in size.
pub fn bounding_box(previous: &TargetFrame, current: &TargetFrame) -> Option<DirtyRect> {
    assert_eq!(
        (previous.width(), previous.height()),
        (current.width(), current.height()),
        "frame size mismatch"
    );

    let mut rect: Option<DirtyRect> = None;
    for y in 0..current.height() {
        let prev = previous.row(y);
        let curr = current.row(y);
        if prev == curr {
            continue;
        }
        let differs = |(a, b): (&u16, &u16)| a != b;
        let first = prev.iter().zip(curr).position(differs);
        let last = prev.iter().zip(curr).rposition(differs);
        if let (Some(first), Some(last)) = (first, last) {
            let (first, last) = (first as u16, last as u16);
            match rect.as_mut() {
                Some(r) => {
                    r.include(first, y);
                    r.include(last, y);
                }
                None => {
                    let mut r = DirtyRect::point(first, y);
                    r.include(last, y);
                    rect = Some(r);
                }
            }
        }
    }
    rect
}

// ── DirtyRegionTracker ───────────────────────────────────────────

/// Holds the baseline frame (what the panel is believed to show) and
/// diffs new frames against it.
///
/// The baseline only moves forward through [`commit`](Self::commit),
/// which the frame loop calls after a transfer completed. While the
/// baseline is unknown (at start-up, or after [`invalidate`](Self::invalidate))
/// every frame is reported as fully dirty.
#[derive(Debug, Clone)]
pub struct DirtyRegionTracker {
    geometry: DisplayGeometry,
    previous: TargetFrame,
    baseline_known: bool,
}

impl DirtyRegionTracker {
    /// A tracker whose baseline is an all-black frame that is assumed to
    /// be on the panel already.
    pub fn new(geometry: DisplayGeometry) -> Self {
        Self {
            geometry,
            previous: TargetFrame::for_geometry(&geometry),
            baseline_known: true,
        }
    }

    /// A tracker that forces a full redraw on its first frame.
    pub fn with_unknown_baseline(geometry: DisplayGeometry) -> Self {
        Self {
            baseline_known: false,
            ..Self::new(geometry)
        }
    }

    /// Compare `current` against the baseline.
    pub fn detect(&self, current: &TargetFrame) -> Option<DirtyRect> {
        if !self.baseline_known {
            return Some(DirtyRect::full(&self.geometry));
        }
        bounding_box(&self.previous, current)
    }

    /// Record `current` as what the panel now shows.
    pub fn commit(&mut self, current: &TargetFrame) {
        self.previous.copy_from(current);
        self.baseline_known = true;
    }

    /// Forget what the panel shows; the next frame is fully dirty.
    pub fn invalidate(&mut self) {
        self.baseline_known = false;
    }

    pub fn baseline_known(&self) -> bool {
        self.baseline_known
    }

    pub fn previous(&self) -> &TargetFrame {
        &self.previous
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn geometry(w: u16, h: u16) -> DisplayGeometry {
        DisplayGeometry::new(w, h).unwrap()
    }

    #[test]
    fn identical_frames_are_clean() {
        let a = TargetFrame::new(16, 16);
        let b = TargetFrame::new(16, 16);
        assert_eq!(bounding_box(&a, &b), None);
    }

    #[test]
    fn single_pixel_change() {
        let prev = TargetFrame::new(16, 16);
        let mut curr = prev.clone();
        curr.set(5, 7, 0xABCD);
        assert_eq!(bounding_box(&prev, &curr), DirtyRect::new(5, 7, 5, 7));
    }

    #[test]
    fn two_corners_span_box() {
        let prev = TargetFrame::new(8, 8);
        let mut curr = prev.clone();
        curr.set(0, 0, 1);
        curr.set(3, 2, 1);
        let rect = bounding_box(&prev, &curr).unwrap();
        assert_eq!(rect, DirtyRect::new(0, 0, 3, 2).unwrap());
        assert_eq!((rect.width(), rect.height()), (4, 3));
    }

    #[test]
    fn anti_diagonal_extends_both_axes() {
        let prev = TargetFrame::new(10, 10);
        let mut curr = prev.clone();
        curr.set(8, 1, 1);
        curr.set(2, 6, 1);
        assert_eq!(bounding_box(&prev, &curr), DirtyRect::new(2, 1, 8, 6));
    }

    #[test]
    fn invalid_rect_is_none() {
        assert!(DirtyRect::new(3, 0, 2, 0).is_none());
        assert!(DirtyRect::new(0, 5, 0, 4).is_none());
    }

    #[test]
    fn full_rect_covers_grid() {
        let g = geometry(100, 50);
        let rect = DirtyRect::full(&g);
        assert_eq!((rect.x_max(), rect.y_max()), (99, 49));
        assert_eq!(rect.area(), 5000);
    }

    #[test]
    fn tracker_commit_moves_baseline() {
        let g = geometry(8, 8);
        let mut tracker = DirtyRegionTracker::new(g);
        let mut frame = TargetFrame::for_geometry(&g);
        frame.set(4, 4, 9);

        assert_eq!(tracker.detect(&frame), Some(DirtyRect::point(4, 4)));
        // Not committed: same answer again.
        assert_eq!(tracker.detect(&frame), Some(DirtyRect::point(4, 4)));

        tracker.commit(&frame);
        assert_eq!(tracker.detect(&frame), None);
    }

    #[test]
    fn unknown_baseline_forces_full_frame() {
        let g = geometry(8, 4);
        let mut tracker = DirtyRegionTracker::with_unknown_baseline(g);
        let frame = TargetFrame::for_geometry(&g);
        assert_eq!(tracker.detect(&frame), Some(DirtyRect::full(&g)));

        tracker.commit(&frame);
        assert_eq!(tracker.detect(&frame), None);

        tracker.invalidate();
        assert!(!tracker.baseline_known());
        assert_eq!(tracker.detect(&frame), DirtyRect::new(0, 0, 7, 3));
    }

    fn frame_pair() -> impl Strategy<Value = (TargetFrame, TargetFrame)> {
        (1u16..24, 1u16..24).prop_flat_map(|(w, h)| {
            let n = w as usize * h as usize;
            (
                proptest::collection::vec(0u16..4, n),
                proptest::collection::vec(0u16..4, n),
            )
                .prop_map(move |(a, b)| {
                    (
                        TargetFrame::from_pixels(w, h, a).unwrap(),
                        TargetFrame::from_pixels(w, h, b).unwrap(),
                    )
                })
        })
    }

    proptest! {
        #[test]
        fn box_is_exact_bounding_box_of_differences((prev, curr) in frame_pair()) {
            let mut expected: Option<DirtyRect> = None;
            for y in 0..curr.height() {
                for x in 0..curr.width() {
                    if prev.get(x, y) != curr.get(x, y) {
                        match expected.as_mut() {
                            Some(r) => r.include(x, y),
                            None => expected = Some(DirtyRect::point(x, y)),
                        }
                    }
                }
            }

            let got = bounding_box(&prev, &curr);
            prop_assert_eq!(got, expected);

            if let Some(rect) = got {
                for y in 0..curr.height() {
                    for x in 0..curr.width() {
                        if prev.get(x, y) != curr.get(x, y) {
                            prop_assert!(rect.contains(x, y));
                        }
                    }
                }
            } else {
                prop_assert_eq!(prev.pixels(), curr.pixels());
            }
        }
    }
}
