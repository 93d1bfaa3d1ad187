//! Windowed pixel transfer to the display controller.
//!
//! The controller keeps a write cursor that walks the programmed window
//! row by row, so a dirty rectangle is sent as one `set_window` followed
//! by its rows back to back. Each row carries the full width of the
//! rectangle, including pixels that did not change.

use crate::error::TransportError;
use crate::pipeline::delta::DirtyRect;
use crate::pipeline::types::{DisplayGeometry, TargetFrame};

// ── DisplayController ────────────────────────────────────────────

/// The panel-facing seam of the pipeline.
///
/// Implemented by [`crate::display::St7789`] for real hardware and by
/// recording fakes in tests.
pub trait DisplayController {
    /// One-time bring-up: reset, wake, pixel format, orientation, on.
    fn initialize(&mut self) -> Result<(), TransportError>;

    /// Program the addressing window; bounds are inclusive device pixels.
    fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), TransportError>;

    /// Stream raw pixel bytes into the current window.
    fn write_pixels(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Pulse the hardware reset line.
    fn reset(&mut self) -> Result<(), TransportError>;
}

impl<T: DisplayController + ?Sized> DisplayController for &mut T {
    fn initialize(&mut self) -> Result<(), TransportError> {
        (**self).initialize()
    }

    fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), TransportError> {
        (**self).set_window(x0, y0, x1, y1)
    }

    fn write_pixels(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_pixels(bytes)
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        (**self).reset()
    }
}

impl<T: DisplayController + ?Sized> DisplayController for Box<T> {
    fn initialize(&mut self) -> Result<(), TransportError> {
        (**self).initialize()
    }

    fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), TransportError> {
        (**self).set_window(x0, y0, x1, y1)
    }

    fn write_pixels(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_pixels(bytes)
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        (**self).reset()
    }
}

// ── DisplayTransport ─────────────────────────────────────────────

/// Sends dirty rectangles of a [`TargetFrame`] to a [`DisplayController`].
pub struct DisplayTransport<D> {
    controller: D,
    geometry: DisplayGeometry,
}

impl<D: DisplayController> DisplayTransport<D> {
    pub fn new(controller: D, geometry: DisplayGeometry) -> Self {
        Self {
            controller,
            geometry,
        }
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    pub fn controller(&self) -> &D {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut D {
        &mut self.controller
    }

    /// Write `rect` of `frame` to the panel. Returns the pixel bytes sent.
    ///
    /// A failure part-way leaves the rows already written on the panel.
    pub fn transfer(
        &mut self,
        rect: &DirtyRect,
        frame: &TargetFrame,
    ) -> Result<usize, TransportError> {
        let g = &self.geometry;
        if !rect.fits_within(g.width(), g.height())
            || (frame.width(), frame.height()) != (g.width(), g.height())
        {
            return Err(TransportError::WindowOutOfBounds {
                x0: rect.x_min(),
                y0: rect.y_min(),
                x1: rect.x_max(),
                y1: rect.y_max(),
                width: g.width(),
                height: g.height(),
            });
        }

        self.controller.set_window(
            rect.x_min() + g.x_offset(),
            rect.y_min() + g.y_offset(),
            rect.x_max() + g.x_offset(),
            rect.y_max() + g.y_offset(),
        )?;

        let mut sent = 0;
        for y in rect.y_min()..=rect.y_max() {
            let row = frame.row_span(y, rect.x_min(), rect.x_max());
            let bytes: &[u8] = bytemuck::cast_slice(row);
            self.controller.write_pixels(bytes)?;
            sent += bytes.len();
        }
        Ok(sent)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        Window(u16, u16, u16, u16),
        Write(Vec<u8>),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        fail_on_write: Option<usize>,
        writes: usize,
    }

    impl DisplayController for Recorder {
        fn initialize(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), TransportError> {
            self.calls.push(Call::Window(x0, y0, x1, y1));
            Ok(())
        }

        fn write_pixels(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.writes += 1;
            if self.fail_on_write == Some(self.writes) {
                return Err(TransportError::Bus("injected".into()));
            }
            self.calls.push(Call::Write(bytes.to_vec()));
            Ok(())
        }

        fn reset(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn ne(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn single_pixel_window_and_write() {
        let g = DisplayGeometry::new(16, 16).unwrap();
        let mut frame = TargetFrame::for_geometry(&g);
        frame.set(5, 7, 0xABCD);
        let mut t = DisplayTransport::new(Recorder::default(), g);

        let sent = t.transfer(&DirtyRect::point(5, 7), &frame).unwrap();
        assert_eq!(sent, 2);
        assert_eq!(
            t.controller().calls,
            vec![Call::Window(5, 7, 5, 7), Call::Write(ne(&[0xABCD]))]
        );
    }

    #[test]
    fn rows_carry_full_rect_width() {
        let g = DisplayGeometry::new(8, 8).unwrap();
        let mut frame = TargetFrame::for_geometry(&g);
        frame.set(0, 0, 0x1111);
        frame.set(3, 2, 0x2222);
        frame.set(1, 1, 0x0F0F);
        let rect = DirtyRect::new(0, 0, 3, 2).unwrap();
        let mut t = DisplayTransport::new(Recorder::default(), g);

        assert_eq!(t.transfer(&rect, &frame).unwrap(), 3 * 4 * 2);
        assert_eq!(
            t.controller().calls,
            vec![
                Call::Window(0, 0, 3, 2),
                Call::Write(ne(&[0x1111, 0, 0, 0])),
                Call::Write(ne(&[0, 0x0F0F, 0, 0])),
                Call::Write(ne(&[0, 0, 0, 0x2222])),
            ]
        );
    }

    #[test]
    fn offset_translates_to_device_coordinates() {
        let g = DisplayGeometry::with_offset(240, 240, 0, 80).unwrap();
        let frame = TargetFrame::for_geometry(&g);
        let mut t = DisplayTransport::new(Recorder::default(), g);
        t.transfer(&DirtyRect::new(10, 0, 20, 1).unwrap(), &frame).unwrap();
        assert_eq!(t.controller().calls[0], Call::Window(10, 80, 20, 81));
    }

    #[test]
    fn offset_at_end_of_device_space() {
        let g = DisplayGeometry::with_offset(16, 4, u16::MAX - 15, u16::MAX - 3).unwrap();
        let frame = TargetFrame::for_geometry(&g);
        let mut t = DisplayTransport::new(Recorder::default(), g);
        t.transfer(&DirtyRect::full(&g), &frame).unwrap();
        assert_eq!(
            t.controller().calls[0],
            Call::Window(u16::MAX - 15, u16::MAX - 3, u16::MAX, u16::MAX)
        );
    }

    #[test]
    fn out_of_bounds_rect_rejected_before_bus_traffic() {
        let g = DisplayGeometry::new(8, 8).unwrap();
        let frame = TargetFrame::for_geometry(&g);
        let mut t = DisplayTransport::new(Recorder::default(), g);
        let err = t.transfer(&DirtyRect::new(0, 0, 8, 0).unwrap(), &frame);
        assert!(matches!(err, Err(TransportError::WindowOutOfBounds { .. })));
        assert!(t.controller().calls.is_empty());
    }

    #[test]
    fn failure_mid_transfer_stops_streaming() {
        let g = DisplayGeometry::new(4, 4).unwrap();
        let frame = TargetFrame::for_geometry(&g);
        let recorder = Recorder {
            fail_on_write: Some(2),
            ..Default::default()
        };
        let mut t = DisplayTransport::new(recorder, g);
        let err = t.transfer(&DirtyRect::full(&g), &frame);
        assert!(matches!(err, Err(TransportError::Bus(_))));
        // Window + first row only.
        assert_eq!(t.controller().calls.len(), 2);
    }
}
