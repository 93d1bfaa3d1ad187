//! ST7789 panel driver over `embedded-hal` 1.0.
//!
//! Four-wire SPI: the data/command line is driven low for the one-byte
//! opcode and high for its parameters and for pixel data. Chip select is
//! owned by the `SpiDevice` implementation.
//!
//! Pixels are sent as RGB565, most significant byte first (`COLMOD 0x55`).

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;

use crate::error::TransportError;
use crate::pipeline::transport::DisplayController;

/// Controller opcodes used by the driver.
pub mod command {
    pub const SWRESET: u8 = 0x01;
    pub const SLPOUT: u8 = 0x11;
    pub const NORON: u8 = 0x13;
    pub const INVOFF: u8 = 0x20;
    pub const INVON: u8 = 0x21;
    pub const DISPON: u8 = 0x29;
    pub const CASET: u8 = 0x2A;
    pub const RASET: u8 = 0x2B;
    pub const RAMWR: u8 = 0x2C;
    pub const MADCTL: u8 = 0x36;
    pub const COLMOD: u8 = 0x3A;

    /// 65k colors, 16 bits per pixel on the interface.
    pub const COLMOD_RGB565: u8 = 0x55;
}

/// Largest single SPI write. Linux spidev rejects transfers above its
/// `bufsiz` (4096 by default).
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Panel-specific bring-up options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelConfig {
    /// Memory access control; selects rotation and mirroring.
    pub madctl: u8,
    /// Turn on color inversion (most IPS modules need it).
    pub invert_colors: bool,
    /// Bytes per SPI write when streaming pixels.
    pub chunk_size: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            madctl: 0x00,
            invert_colors: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Placeholder for an unconnected reset or backlight line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPin;

impl embedded_hal::digital::ErrorType for NoPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// ST7789 driver implementing [`DisplayController`].
pub struct St7789<SPI, DC, RST = NoPin, BL = NoPin, DELAY = NoDelay> {
    spi: SPI,
    dc: DC,
    rst: Option<RST>,
    backlight: Option<BL>,
    delay: DELAY,
    config: PanelConfig,
}

/// Delay that returns immediately. Only useful where the controller
/// timing does not matter, such as in bus traces.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

impl<SPI, DC, RST, BL, DELAY> St7789<SPI, DC, RST, BL, DELAY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
    DELAY: DelayNs,
{
    pub fn new(
        spi: SPI,
        dc: DC,
        rst: Option<RST>,
        backlight: Option<BL>,
        delay: DELAY,
        config: PanelConfig,
    ) -> Self {
        Self {
            spi,
            dc,
            rst,
            backlight,
            delay,
            config: PanelConfig {
                chunk_size: config.chunk_size.max(2),
                ..config
            },
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Send an opcode followed by its parameter bytes.
    pub fn command(&mut self, opcode: u8, params: &[u8]) -> Result<(), TransportError> {
        self.dc.set_low().map_err(pin_error)?;
        self.spi.write(&[opcode]).map_err(bus_error)?;
        if !params.is_empty() {
            self.dc.set_high().map_err(pin_error)?;
            self.spi.write(params).map_err(bus_error)?;
        }
        Ok(())
    }

    /// Drive the backlight line, if wired.
    pub fn set_backlight(&mut self, on: bool) -> Result<(), TransportError> {
        if let Some(bl) = self.backlight.as_mut() {
            if on {
                bl.set_high().map_err(pin_error)?;
            } else {
                bl.set_low().map_err(pin_error)?;
            }
        }
        Ok(())
    }
}

impl<SPI, DC, RST, BL, DELAY> DisplayController for St7789<SPI, DC, RST, BL, DELAY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
    DELAY: DelayNs,
{
    fn initialize(&mut self) -> Result<(), TransportError> {
        use command::*;

        self.reset()?;
        self.set_backlight(true)?;

        self.command(SWRESET, &[])?;
        self.delay.delay_ms(150);
        self.command(SLPOUT, &[])?;
        self.delay.delay_ms(150);

        self.command(COLMOD, &[COLMOD_RGB565])?;
        self.command(MADCTL, &[self.config.madctl])?;
        let inversion = if self.config.invert_colors { INVON } else { INVOFF };
        self.command(inversion, &[])?;
        self.command(NORON, &[])?;
        self.command(DISPON, &[])?;
        self.delay.delay_ms(50);
        Ok(())
    }

    fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), TransportError> {
        let [x0h, x0l] = x0.to_be_bytes();
        let [x1h, x1l] = x1.to_be_bytes();
        let [y0h, y0l] = y0.to_be_bytes();
        let [y1h, y1l] = y1.to_be_bytes();
        self.command(command::CASET, &[x0h, x0l, x1h, x1l])?;
        self.command(command::RASET, &[y0h, y0l, y1h, y1l])?;
        self.command(command::RAMWR, &[])
    }

    fn write_pixels(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.dc.set_high().map_err(pin_error)?;
        for chunk in bytes.chunks(self.config.chunk_size) {
            self.spi.write(chunk).map_err(bus_error)?;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        match self.rst.as_mut() {
            Some(rst) => {
                rst.set_low().map_err(pin_error)?;
                self.delay.delay_ms(100);
                rst.set_high().map_err(pin_error)?;
                self.delay.delay_ms(100);
                Ok(())
            }
            None => {
                self.command(command::SWRESET, &[])?;
                self.delay.delay_ms(150);
                Ok(())
            }
        }
    }
}

fn bus_error<E: core::fmt::Debug>(e: E) -> TransportError {
    TransportError::Bus(format!("{e:?}"))
}

fn pin_error<E: core::fmt::Debug>(e: E) -> TransportError {
    TransportError::Pin(format!("{e:?}"))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use embedded_hal::spi::{ErrorKind, Operation};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Dc(bool),
        Rst(bool),
        Bl(bool),
        Spi(Vec<u8>),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    #[derive(Debug)]
    struct BusFault;

    impl embedded_hal::spi::Error for BusFault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    struct FakeSpi {
        log: Log,
        fail: bool,
    }

    impl embedded_hal::spi::ErrorType for FakeSpi {
        type Error = BusFault;
    }

    impl SpiDevice for FakeSpi {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), BusFault> {
            if self.fail {
                return Err(BusFault);
            }
            for op in operations.iter() {
                if let Operation::Write(buf) = op {
                    self.log.borrow_mut().push(Event::Spi(buf.to_vec()));
                }
            }
            Ok(())
        }
    }

    struct FakePin {
        log: Log,
        make: fn(bool) -> Event,
    }

    impl embedded_hal::digital::ErrorType for FakePin {
        type Error = core::convert::Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.log.borrow_mut().push((self.make)(false));
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.log.borrow_mut().push((self.make)(true));
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingDelay {
        total_ns: Rc<RefCell<u64>>,
    }

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            *self.total_ns.borrow_mut() += ns as u64;
        }
    }

    type TestPanel = St7789<FakeSpi, FakePin, FakePin, FakePin, CountingDelay>;

    fn panel(config: PanelConfig) -> (TestPanel, Log) {
        let log: Log = Rc::default();
        let pin = |make: fn(bool) -> Event| FakePin {
            log: Rc::clone(&log),
            make,
        };
        let display = St7789::new(
            FakeSpi {
                log: Rc::clone(&log),
                fail: false,
            },
            pin(Event::Dc),
            Some(pin(Event::Rst)),
            Some(pin(Event::Bl)),
            CountingDelay::default(),
            config,
        );
        (display, log)
    }

    /// Opcodes with their parameters, reconstructed from the DC line.
    fn commands(log: &[Event]) -> Vec<(u8, Vec<u8>)> {
        let mut out: Vec<(u8, Vec<u8>)> = Vec::new();
        let mut dc = true;
        for ev in log {
            match ev {
                Event::Dc(level) => dc = *level,
                Event::Spi(bytes) if !dc => out.push((bytes[0], Vec::new())),
                Event::Spi(bytes) => {
                    if let Some(last) = out.last_mut() {
                        last.1.extend_from_slice(bytes);
                    }
                }
                _ => {}
            }
        }
        out
    }

    #[test]
    fn init_sequence() {
        let (mut d, log) = panel(PanelConfig::default());
        d.initialize().unwrap();

        let log = log.borrow();
        assert_eq!(&log[..2], &[Event::Rst(false), Event::Rst(true)]);
        assert_eq!(log[2], Event::Bl(true));
        assert_eq!(
            commands(&log),
            vec![
                (command::SWRESET, vec![]),
                (command::SLPOUT, vec![]),
                (command::COLMOD, vec![0x55]),
                (command::MADCTL, vec![0x00]),
                (command::INVON, vec![]),
                (command::NORON, vec![]),
                (command::DISPON, vec![]),
            ]
        );
    }

    #[test]
    fn init_waits_for_controller() {
        let (mut d, _log) = panel(PanelConfig::default());
        let total = Rc::clone(&d.delay.total_ns);
        d.initialize().unwrap();
        // 100 + 100 reset, 150 + 150 wake, 50 display on.
        assert_eq!(*total.borrow(), 550 * 1_000_000);
    }

    #[test]
    fn orientation_and_inversion_follow_config() {
        let (mut d, log) = panel(PanelConfig {
            madctl: 0x70,
            invert_colors: false,
            ..PanelConfig::default()
        });
        d.initialize().unwrap();
        let cmds = commands(&log.borrow());
        assert!(cmds.contains(&(command::MADCTL, vec![0x70])));
        assert!(cmds.contains(&(command::INVOFF, vec![])));
        assert!(!cmds.iter().any(|(op, _)| *op == command::INVON));
    }

    #[test]
    fn window_is_big_endian_and_ends_in_ramwr() {
        let (mut d, log) = panel(PanelConfig::default());
        d.set_window(5, 7, 0x0123, 0x00EF).unwrap();
        assert_eq!(
            commands(&log.borrow()),
            vec![
                (command::CASET, vec![0x00, 0x05, 0x01, 0x23]),
                (command::RASET, vec![0x00, 0x07, 0x00, 0xEF]),
                (command::RAMWR, vec![]),
            ]
        );
    }

    #[test]
    fn pixels_are_chunked_with_dc_high() {
        let (mut d, log) = panel(PanelConfig {
            chunk_size: 4,
            ..PanelConfig::default()
        });
        d.write_pixels(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                Event::Dc(true),
                Event::Spi(vec![1, 2, 3, 4]),
                Event::Spi(vec![5, 6]),
            ]
        );
    }

    #[test]
    fn bus_fault_maps_to_transport_error() {
        let (mut d, _log) = panel(PanelConfig::default());
        d.spi.fail = true;
        assert!(matches!(d.write_pixels(&[0, 0]), Err(TransportError::Bus(_))));
    }

    #[test]
    fn reset_without_pin_uses_software_reset() {
        let log: Log = Rc::default();
        let mut d: St7789<FakeSpi, FakePin> = St7789::new(
            FakeSpi {
                log: Rc::clone(&log),
                fail: false,
            },
            FakePin {
                log: Rc::clone(&log),
                make: Event::Dc,
            },
            None,
            None,
            NoDelay,
            PanelConfig::default(),
        );
        d.reset().unwrap();
        assert_eq!(commands(&log.borrow()), vec![(command::SWRESET, vec![])]);
    }
}
