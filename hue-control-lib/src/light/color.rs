use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Number of distinct hue values the bridge accepts (16 bit).
pub const HUE_RANGE: i64 = 65536;

/// Highest saturation the bridge accepts.
pub const MAX_SATURATION: u8 = 254;

/// Named colors on the bridge's 16-bit hue wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamedHue {
    Red,
    Orange,
    Yellow,
    Green,
    White,
    Blue,
    Purple,
    Magenta,
    Pink,
    Rose,
}

impl NamedHue {
    pub const ALL: [NamedHue; 10] = [
        NamedHue::Red,
        NamedHue::Orange,
        NamedHue::Yellow,
        NamedHue::Green,
        NamedHue::White,
        NamedHue::Blue,
        NamedHue::Purple,
        NamedHue::Magenta,
        NamedHue::Pink,
        NamedHue::Rose,
    ];

    /// The hue value sent to the bridge for this color.
    pub const fn value(self) -> u16 {
        match self {
            NamedHue::Red => 0,
            NamedHue::Orange => 8192,
            NamedHue::Yellow => 8192 * 2,
            NamedHue::Green => 8192 * 3,
            NamedHue::White => 8192 * 4,
            NamedHue::Blue => 8192 * 5 + 4096,
            NamedHue::Purple => 8192 * 6,
            NamedHue::Magenta => 8192 * 7,
            NamedHue::Pink => 8192 * 7 + 4096,
            NamedHue::Rose => 8192 * 7 + 4096 + 2048,
        }
    }
}

impl From<NamedHue> for u16 {
    fn from(hue: NamedHue) -> Self {
        hue.value()
    }
}

impl FromStr for NamedHue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NamedHue::ALL
            .into_iter()
            .find(|hue| hue.to_string() == s.to_lowercase())
            .ok_or_else(|| anyhow!("Invalid color name: {}", s))
    }
}

impl fmt::Display for NamedHue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NamedHue::Red => "red",
            NamedHue::Orange => "orange",
            NamedHue::Yellow => "yellow",
            NamedHue::Green => "green",
            NamedHue::White => "white",
            NamedHue::Blue => "blue",
            NamedHue::Purple => "purple",
            NamedHue::Magenta => "magenta",
            NamedHue::Pink => "pink",
            NamedHue::Rose => "rose",
        };
        write!(f, "{}", name)
    }
}

/// Clamps a brightness to the 8-bit range.
pub fn clamp_brightness(brightness: i64) -> u8 {
    brightness.clamp(u8::MIN as i64, u8::MAX as i64) as u8
}

/// Clamps one color coordinate to `[0, 1]`. NaN maps to 0.
pub fn clamp_coordinate(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Wraps any integer onto the hue wheel.
pub fn normalize_hue(hue: i64) -> u16 {
    hue.rem_euclid(HUE_RANGE) as u16
}

pub fn clamp_saturation(saturation: i64) -> u8 {
    saturation.clamp(0, MAX_SATURATION as i64) as u8
}
