//! Configuration for the mirror service.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use spimirror_core::{
    CaptureRegion, ChannelLayout, DisplayGeometry, FrameLoopConfig, MirrorError, PanelConfig,
    TransportFailurePolicy,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Panel geometry and controller options.
    pub display: DisplayConfig,
    /// SPI bus settings.
    pub spi: SpiConfig,
    /// GPIO control lines.
    pub pins: PinConfig,
    /// Screen capture settings.
    pub capture: CaptureConfig,
    /// Frame loop tuning.
    pub pipeline: PipelineConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Panel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Visible width in pixels.
    pub width: u16,
    /// Visible height in pixels.
    pub height: u16,
    /// Column of the visible area in controller RAM.
    pub x_offset: u16,
    /// Row of the visible area in controller RAM.
    pub y_offset: u16,
    /// MADCTL byte (rotation and mirroring).
    pub madctl: u8,
    /// Enable color inversion (needed by most IPS modules).
    pub invert_colors: bool,
}

/// SPI bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiConfig {
    /// spidev device node.
    pub device: String,
    /// Clock speed in Hz.
    pub speed_hz: u32,
    /// SPI mode, 0 to 3.
    pub mode: u8,
    /// Maximum bytes per write; must not exceed the spidev `bufsiz`.
    pub chunk_size: usize,
}

/// GPIO lines, as offsets on `gpio_chip`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// GPIO character device.
    pub gpio_chip: String,
    /// Data/command select line.
    pub dc: u32,
    /// Reset line. Without it the panel is reset in software.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<u32>,
    /// Backlight enable line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlight: Option<u32>,
}

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureBackend {
    /// The X11 root window.
    X11,
    /// Generated color bars.
    TestPattern,
}

/// Channel order of captured pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Xrgb,
    Xbgr,
}

impl ChannelOrder {
    pub fn layout(self) -> ChannelLayout {
        match self {
            Self::Xrgb => ChannelLayout::XRGB8888,
            Self::Xbgr => ChannelLayout::XBGR8888,
        }
    }
}

/// Screen capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub backend: CaptureBackend,
    /// X display name. Empty means `$DISPLAY`.
    pub display: String,
    pub channel_order: ChannelOrder,
    /// Left edge of the mirrored region.
    pub x: u32,
    /// Top edge of the mirrored region.
    pub y: u32,
    /// Region width; 0 together with `height = 0` mirrors the whole screen.
    pub width: u32,
    pub height: u32,
    /// Consecutive capture failures tolerated before exiting.
    pub retries: u32,
    /// Pause between capture retries in milliseconds.
    pub retry_delay_ms: u64,
}

/// Frame loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame rate cap; 0 runs as fast as the bus allows.
    pub max_fps: u32,
    /// "retry-delta" or "full-redraw".
    pub on_transport_error: TransportFailurePolicy,
    /// Redraw the whole panel on the first frame.
    pub full_redraw_on_start: bool,
    /// Statistics log interval in milliseconds.
    pub stats_interval_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 240,
            height: 240,
            x_offset: 0,
            y_offset: 0,
            madctl: 0x00,
            invert_colors: true,
        }
    }
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            device: "/dev/spidev0.0".into(),
            speed_hz: 16_000_000,
            mode: 0,
            chunk_size: 4096,
        }
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            gpio_chip: "/dev/gpiochip0".into(),
            dc: 24,
            reset: Some(22),
            backlight: Some(17),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::X11,
            display: String::new(),
            channel_order: ChannelOrder::Xrgb,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            retries: 0,
            retry_delay_ms: 500,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_fps: 0,
            on_transport_error: TransportFailurePolicy::RetryDelta,
            full_redraw_on_start: true,
            stats_interval_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl MirrorConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Returns the reason for the fallback alongside the defaults, so the
    /// caller can report it once logging is set up.
    pub fn load(path: &Path) -> (Self, Option<MirrorError>) {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => return (Self::default(), Some(MirrorError::Io(e))),
        };
        match toml::from_str(&contents) {
            Ok(config) => (config, None),
            Err(e) => (
                Self::default(),
                Some(MirrorError::Config(format!(
                    "invalid config {}: {e}",
                    path.display()
                ))),
            ),
        }
    }

    /// The capture region, or `None` for the whole surface.
    pub fn capture_region(&self) -> Result<Option<CaptureRegion>, MirrorError> {
        let c = &self.capture;
        match (c.width, c.height) {
            (0, 0) => {
                if c.x != 0 || c.y != 0 {
                    return Err(MirrorError::Config(
                        "capture.x/y need capture.width and capture.height".into(),
                    ));
                }
                Ok(None)
            }
            (0, _) | (_, 0) => Err(MirrorError::Config(
                "capture.width and capture.height must both be set or both be 0".into(),
            )),
            (width, height) => Ok(Some(CaptureRegion {
                x: c.x,
                y: c.y,
                width,
                height,
            })),
        }
    }

    /// Convert into the core frame loop settings.
    pub fn to_loop_config(&self) -> Result<FrameLoopConfig, MirrorError> {
        let d = &self.display;
        Ok(FrameLoopConfig {
            geometry: DisplayGeometry::with_offset(d.width, d.height, d.x_offset, d.y_offset)?,
            layout: self.capture.channel_order.layout(),
            region: self.capture_region()?,
            max_fps: self.pipeline.max_fps,
            capture_retries: self.capture.retries,
            capture_retry_delay: Duration::from_millis(self.capture.retry_delay_ms),
            on_transport_error: self.pipeline.on_transport_error,
            full_redraw_on_start: self.pipeline.full_redraw_on_start,
            stats_interval: Duration::from_millis(self.pipeline.stats_interval_ms.max(1)),
        })
    }

    /// Controller options for the ST7789 driver.
    pub fn panel_config(&self) -> PanelConfig {
        PanelConfig {
            madctl: self.display.madctl,
            invert_colors: self.display.invert_colors,
            chunk_size: self.spi.chunk_size,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
