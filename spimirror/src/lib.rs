//! # spimirror: desktop mirror for SPI displays
//!
//! Captures the X11 root window, runs it through the
//! [`spimirror_core`] pipeline and drives an ST7789 panel over Linux
//! spidev with GPIO-cdev control lines.
//!
//! ## Modes
//!
//! - **x11**: mirror the desktop named by `capture.display` (or `$DISPLAY`).
//! - **test-pattern**: animated color bars, for checking wiring without
//!   an X server.

pub mod capture;
pub mod config;
pub mod hardware;
pub mod service;
