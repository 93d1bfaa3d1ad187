//! Display controller drivers.
//!
//! | Module   | Purpose                                        |
//! |----------|------------------------------------------------|
//! | `st7789` | ST7789 TFT controller over 4-wire SPI          |

pub mod st7789;

pub use st7789::{NoDelay, NoPin, PanelConfig, St7789};
