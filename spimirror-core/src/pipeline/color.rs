//! 32-bit → RGB565 color conversion.
//!
//! The panel takes 16-bit pixels as 5 bits red, 6 bits green, 5 bits
//! blue, most significant byte first on the wire. Conversion is plain
//! channel truncation; there is no gamma or dithering.

use serde::{Deserialize, Serialize};

// ── ChannelLayout ────────────────────────────────────────────────

/// Bit offsets of the 8-bit channels inside a captured 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl ChannelLayout {
    /// `0xXXRRGGBB`, the common X11 TrueColor layout on little-endian hosts.
    pub const XRGB8888: Self = Self {
        red_shift: 16,
        green_shift: 8,
        blue_shift: 0,
    };

    /// `0xXXBBGGRR`.
    pub const XBGR8888: Self = Self {
        red_shift: 0,
        green_shift: 8,
        blue_shift: 16,
    };

    /// Whether every channel fits inside a 32-bit word.
    pub fn is_valid(&self) -> bool {
        self.red_shift <= 24 && self.green_shift <= 24 && self.blue_shift <= 24
    }

    /// Split a source word into `(r, g, b)`.
    #[inline]
    pub fn extract(&self, word: u32) -> (u8, u8, u8) {
        (
            (word >> self.red_shift) as u8,
            (word >> self.green_shift) as u8,
            (word >> self.blue_shift) as u8,
        )
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::XRGB8888
    }
}

// ── Conversion ───────────────────────────────────────────────────

/// Pack 8-bit channels into native-order RGB565.
#[inline]
pub const fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// Reverse the two bytes of a 16-bit value.
#[inline]
pub const fn swap_bytes(value: u16) -> u16 {
    value.swap_bytes()
}

/// Native RGB565 → value whose in-memory bytes are big-endian.
///
/// On little-endian hosts this is [`swap_bytes`]; on big-endian hosts it
/// is the identity.
#[inline]
pub const fn to_wire(value: u16) -> u16 {
    value.to_be()
}

/// Inverse of [`to_wire`].
#[inline]
pub const fn from_wire(value: u16) -> u16 {
    u16::from_be(value)
}

/// Converts captured words into wire-order RGB565.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorConverter {
    layout: ChannelLayout,
}

impl ColorConverter {
    pub fn new(layout: ChannelLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    #[inline]
    pub fn convert(&self, word: u32) -> u16 {
        let (r, g, b) = self.layout.extract(word);
        to_wire(rgb565(r, g, b))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn primaries() {
        assert_eq!(rgb565(0xFF, 0, 0), 0xF800);
        assert_eq!(rgb565(0, 0xFF, 0), 0x07E0);
        assert_eq!(rgb565(0, 0, 0xFF), 0x001F);
        assert_eq!(rgb565(0xFF, 0xFF, 0xFF), 0xFFFF);
    }

    #[test]
    fn wire_bytes_are_big_endian() {
        let wire = to_wire(0xF800);
        assert_eq!(wire.to_ne_bytes(), [0xF8, 0x00]);
        assert_eq!(from_wire(wire), 0xF800);
    }

    #[test]
    fn converter_uses_layout() {
        let xrgb = ColorConverter::new(ChannelLayout::XRGB8888);
        let xbgr = ColorConverter::new(ChannelLayout::XBGR8888);
        let red_in_xrgb = 0x00FF_0000;
        assert_eq!(from_wire(xrgb.convert(red_in_xrgb)), 0xF800);
        // The same word read as XBGR is pure blue.
        assert_eq!(from_wire(xbgr.convert(red_in_xrgb)), 0x001F);
    }

    #[test]
    fn alpha_byte_is_ignored() {
        let conv = ColorConverter::default();
        assert_eq!(conv.convert(0xFF12_3456), conv.convert(0x0012_3456));
    }

    #[test]
    fn layout_validation() {
        assert!(ChannelLayout::XRGB8888.is_valid());
        let bad = ChannelLayout {
            red_shift: 28,
            green_shift: 8,
            blue_shift: 0,
        };
        assert!(!bad.is_valid());
    }

    #[test]
    fn swap_twice_is_identity_for_all_values() {
        for v in 0..=u16::MAX {
            assert_eq!(swap_bytes(swap_bytes(v)), v);
        }
    }

    proptest! {
        #[test]
        fn components_are_truncated_channels(r: u8, g: u8, b: u8) {
            let c = rgb565(r, g, b);
            prop_assert_eq!(c >> 11, (r >> 3) as u16);
            prop_assert_eq!((c >> 5) & 0x3F, (g >> 2) as u16);
            prop_assert_eq!(c & 0x1F, (b >> 3) as u16);
        }

        #[test]
        fn converter_matches_manual_pack(word: u32) {
            let conv = ColorConverter::new(ChannelLayout::XRGB8888);
            let r = (word >> 16) as u8;
            let g = (word >> 8) as u8;
            let b = word as u8;
            prop_assert_eq!(from_wire(conv.convert(word)), rgb565(r, g, b));
        }
    }
}
