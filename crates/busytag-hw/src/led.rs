//! LED strip types: pin selectors, colors and solid-color configuration.
//!
//! The Busy Tag addresses its seven LEDs with a bitmask where pin `n` is bit
//! `n`. Colors travel as uppercase six digit hex (`FF4D00`).

use crate::{Error, Result};
use std::str::FromStr;

/// Number of individually addressable LEDs.
pub const LED_COUNT: u8 = 7;

/// Mask selecting every LED.
pub const ALL_PINS_MASK: u8 = (1 << LED_COUNT) - 1;

/// LED pin selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedPin {
    Pin0,
    Pin1,
    Pin2,
    Pin3,
    Pin4,
    Pin5,
    Pin6,
    /// Every LED on the strip.
    #[default]
    All,
}

impl LedPin {
    /// Returns the wire bitmask for this selector.
    pub fn bits(&self) -> u8 {
        match self {
            LedPin::Pin0 => 1 << 0,
            LedPin::Pin1 => 1 << 1,
            LedPin::Pin2 => 1 << 2,
            LedPin::Pin3 => 1 << 3,
            LedPin::Pin4 => 1 << 4,
            LedPin::Pin5 => 1 << 5,
            LedPin::Pin6 => 1 << 6,
            LedPin::All => ALL_PINS_MASK,
        }
    }

    /// Returns the selector for an individual pin index.
    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            0 => Ok(LedPin::Pin0),
            1 => Ok(LedPin::Pin1),
            2 => Ok(LedPin::Pin2),
            3 => Ok(LedPin::Pin3),
            4 => Ok(LedPin::Pin4),
            5 => Ok(LedPin::Pin5),
            6 => Ok(LedPin::Pin6),
            _ => Err(Error::InvalidPin(format!("index {}", index))),
        }
    }

    /// Converts a wire bitmask back to a selector, if it names exactly one.
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits == ALL_PINS_MASK {
            return Ok(LedPin::All);
        }
        if bits.count_ones() == 1 && bits < ALL_PINS_MASK {
            return Self::from_index(bits.trailing_zeros() as u8);
        }
        Err(Error::InvalidPin(format!("mask {}", bits)))
    }
}

impl FromStr for LedPin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "all" {
            return Ok(LedPin::All);
        }
        let index = s.strip_prefix("pin").unwrap_or(&s);
        index
            .parse::<u8>()
            .map_err(|_| Error::InvalidPin(s.clone()))
            .and_then(Self::from_index)
    }
}

impl std::fmt::Display for LedPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedPin::All => write!(f, "all"),
            pin => write!(f, "pin{}", pin.bits().trailing_zeros()),
        }
    }
}

/// 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const BLACK: RgbColor = RgbColor::new(0, 0, 0);
    pub const WHITE: RgbColor = RgbColor::new(0xFF, 0xFF, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Packs the color as `0xRRGGBB`.
    pub fn to_u32(&self) -> u32 {
        (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }

    /// Uppercase hex as sent on the wire.
    pub fn to_hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for RgbColor {
    type Err = Error;

    /// Parses `RRGGBB`, with or without a leading `#`, in either case.
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidColor(s.to_string()));
        }
        let value =
            u32::from_str_radix(hex, 16).map_err(|_| Error::InvalidColor(s.to_string()))?;
        Ok(Self::new(
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ))
    }
}

impl std::fmt::Display for RgbColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Solid color applied to a set of LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedConfig {
    pin_bits: u8,
    color: RgbColor,
}

impl LedConfig {
    /// Creates a configuration for a single selector.
    pub fn new(pin: LedPin, color: RgbColor) -> Self {
        Self {
            pin_bits: pin.bits(),
            color,
        }
    }

    /// Creates a configuration from a raw pin mask and a hex color string.
    pub fn parse(pin_bits: u8, color: &str) -> Result<Self> {
        let color = color.parse()?;
        Self::from_mask(pin_bits, color)
    }

    /// Creates a configuration covering several pins at once.
    pub fn from_mask(pin_bits: u8, color: RgbColor) -> Result<Self> {
        if pin_bits == 0 || pin_bits > ALL_PINS_MASK {
            return Err(Error::InvalidPin(format!("mask {}", pin_bits)));
        }
        Ok(Self { pin_bits, color })
    }

    pub fn pin_bits(&self) -> u8 {
        self.pin_bits
    }

    /// Returns the selector if the mask names exactly one pin or all of them.
    pub fn pin(&self) -> Option<LedPin> {
        LedPin::from_bits(self.pin_bits).ok()
    }

    pub fn color(&self) -> RgbColor {
        self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_bits() {
        assert_eq!(LedPin::Pin0.bits(), 0x01);
        assert_eq!(LedPin::Pin6.bits(), 0x40);
        assert_eq!(LedPin::All.bits(), 127);
    }

    #[test]
    fn test_pin_from_bits() {
        assert_eq!(LedPin::from_bits(127).unwrap(), LedPin::All);
        assert_eq!(LedPin::from_bits(0x08).unwrap(), LedPin::Pin3);
        assert!(LedPin::from_bits(0).is_err());
        assert!(LedPin::from_bits(0x03).is_err());
        assert!(LedPin::from_bits(0x80).is_err());
    }

    #[test]
    fn test_pin_from_str() {
        assert_eq!("all".parse::<LedPin>().unwrap(), LedPin::All);
        assert_eq!("ALL".parse::<LedPin>().unwrap(), LedPin::All);
        assert_eq!("pin4".parse::<LedPin>().unwrap(), LedPin::Pin4);
        assert_eq!("2".parse::<LedPin>().unwrap(), LedPin::Pin2);
        assert!("7".parse::<LedPin>().is_err());
        assert!("left".parse::<LedPin>().is_err());
    }

    #[test]
    fn test_pin_display() {
        assert_eq!(LedPin::Pin5.to_string(), "pin5");
        assert_eq!(LedPin::All.to_string(), "all");
    }

    #[test]
    fn test_color_parse() {
        let color: RgbColor = "FF4D00".parse().unwrap();
        assert_eq!(color, RgbColor::new(0xFF, 0x4D, 0x00));
        assert_eq!("#ff4d00".parse::<RgbColor>().unwrap(), color);
        assert_eq!(color.to_u32(), 0xFF4D00);
        assert!("FF4D0".parse::<RgbColor>().is_err());
        assert!("GG0000".parse::<RgbColor>().is_err());
        assert!("+F4D00".parse::<RgbColor>().is_err());
    }

    #[test]
    fn test_color_hex_is_uppercase() {
        assert_eq!(RgbColor::new(0xab, 0x01, 0xcd).to_hex(), "AB01CD");
        assert_eq!(RgbColor::BLACK.to_string(), "000000");
    }

    #[test]
    fn test_config_mask_validation() {
        assert!(LedConfig::from_mask(0, RgbColor::WHITE).is_err());
        assert!(LedConfig::from_mask(128, RgbColor::WHITE).is_err());
        let config = LedConfig::from_mask(0x05, RgbColor::WHITE).unwrap();
        assert_eq!(config.pin_bits(), 0x05);
        assert_eq!(config.pin(), None);
        assert_eq!(
            LedConfig::new(LedPin::All, RgbColor::WHITE).pin(),
            Some(LedPin::All)
        );
    }
}
