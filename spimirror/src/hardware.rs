//! Panel bring-up on Linux spidev and GPIO character devices.
//!
//! Other platforms get a stub that reports the missing backend, so the
//! crate still builds (and its config tests run) off-target.

use spimirror_core::{DisplayController, MirrorError};

use crate::config::MirrorConfig;

#[cfg(target_os = "linux")]
pub use linux::{Panel, open_panel};

/// Open the configured panel behind the [`DisplayController`] seam.
pub fn open_controller(config: &MirrorConfig) -> Result<Box<dyn DisplayController>, MirrorError> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(open_panel(config)?))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = config;
        Err(MirrorError::Initialization(
            "SPI display output requires Linux spidev".into(),
        ))
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::fmt::Debug;

    use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
    use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
    use linux_embedded_hal::{CdevPin, Delay, SpidevDevice};
    use tracing::info;

    use spimirror_core::{MirrorError, St7789};

    use crate::config::MirrorConfig;

    /// The ST7789 wired to spidev with cdev control lines.
    pub type Panel = St7789<SpidevDevice, CdevPin, CdevPin, CdevPin, Delay>;

    fn failed<E: Debug>(what: String) -> impl FnOnce(E) -> MirrorError {
        move |e| MirrorError::Initialization(format!("{what}: {e:?}"))
    }

    /// Claim the bus and the control lines.
    pub fn open_panel(config: &MirrorConfig) -> Result<Panel, MirrorError> {
        let spi_cfg = &config.spi;
        let mode = match spi_cfg.mode {
            0 => SpiModeFlags::SPI_MODE_0,
            1 => SpiModeFlags::SPI_MODE_1,
            2 => SpiModeFlags::SPI_MODE_2,
            3 => SpiModeFlags::SPI_MODE_3,
            m => return Err(MirrorError::Config(format!("spi.mode must be 0-3, got {m}"))),
        };

        let mut spi = SpidevDevice::open(&spi_cfg.device)
            .map_err(failed(format!("open {}", spi_cfg.device)))?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(spi_cfg.speed_hz)
            .mode(mode)
            .build();
        spi.0
            .configure(&options)
            .map_err(failed(format!("configure {}", spi_cfg.device)))?;

        let pins = &config.pins;
        let mut chip =
            Chip::new(&pins.gpio_chip).map_err(failed(format!("open {}", pins.gpio_chip)))?;
        let mut output = |offset: u32, level: u8, label: &str| -> Result<CdevPin, MirrorError> {
            let handle = chip
                .get_line(offset)
                .and_then(|line| line.request(LineRequestFlags::OUTPUT, level, label))
                .map_err(failed(format!("request GPIO {offset} for {label}")))?;
            CdevPin::new(handle).map_err(failed(format!("GPIO {offset}")))
        };

        let dc = output(pins.dc, 0, "spimirror-dc")?;
        let rst = pins.reset.map(|n| output(n, 1, "spimirror-rst")).transpose()?;
        let backlight = pins
            .backlight
            .map(|n| output(n, 0, "spimirror-bl"))
            .transpose()?;

        info!(
            "panel on {} at {} Hz, mode {}, DC=GPIO{} RST={:?} BL={:?}",
            spi_cfg.device, spi_cfg.speed_hz, spi_cfg.mode, pins.dc, pins.reset, pins.backlight
        );

        Ok(St7789::new(spi, dc, rst, backlight, Delay, config.panel_config()))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_spi_device_is_initialization_error() {
        let mut cfg = MirrorConfig::default();
        cfg.spi.device = "/nonexistent/spidev9.9".into();
        assert!(matches!(
            open_controller(&cfg),
            Err(MirrorError::Initialization(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn bad_spi_mode_is_config_error() {
        let mut cfg = MirrorConfig::default();
        cfg.spi.mode = 4;
        assert!(matches!(open_panel(&cfg), Err(MirrorError::Config(_))));
    }
}
