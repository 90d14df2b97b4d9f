//! Solid color value mirrored onto the keyboard.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// RGB color plus a brightness scalar.
///
/// Two colors are equal only if every channel, brightness included, matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "full_brightness")]
    pub brightness: u8,
}

const fn full_brightness() -> u8 {
    Color::FULL_BRIGHTNESS
}

impl Color {
    /// Brightness used when none is given.
    pub const FULL_BRIGHTNESS: u8 = u8::MAX;

    /// Create a color at full brightness.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, brightness: Self::FULL_BRIGHTNESS }
    }

    /// Create a color with an explicit brightness.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, brightness: u8) -> Self {
        Self { r, g, b, brightness }
    }

    /// Same color with a different brightness.
    #[must_use]
    pub const fn with_brightness(self, brightness: u8) -> Self {
        Self { brightness, ..self }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::rgb(0, 0, 0)
    }
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix('#'))
            .filter(|hex| hex.len() == 6 && hex.bytes().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| Error::InvalidColor(s.to_string()))?;

        let packed = u32::from_str_radix(hex, 16).map_err(|_| Error::InvalidColor(s.to_string()))?;
        let [_, r, g, b] = packed.to_be_bytes();

        Ok(Self::rgb(r, g, b))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.brightness != Self::FULL_BRIGHTNESS {
            write!(f, "@{}", self.brightness)?;
        }
        Ok(())
    }
}
