use serde::{Deserialize, Serialize};

use crate::{Result, TreeError};

/// A single 8-bit RGB colour as written to the pixel buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);
    /// Fill used when the tree is powered on with nothing to show.
    pub const DIM_WHITE: Rgb = Rgb::new(51, 51, 51);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_black(&self) -> bool {
        *self == Self::BLACK
    }

    /// Scales every channel by `factor` (clamped to `[0, 1]`), truncating.
    pub fn scale(self, factor: f32) -> Self {
        let factor = if factor.is_finite() {
            factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            r: (self.r as f32 * factor) as u8,
            g: (self.g as f32 * factor) as u8,
            b: (self.b as f32 * factor) as u8,
        }
    }

    /// Per-channel maximum. Overlapping contributions never overflow.
    pub fn max(self, other: Self) -> Self {
        Self {
            r: self.r.max(other.r),
            g: self.g.max(other.g),
            b: self.b.max(other.b),
        }
    }

    /// Perceived brightness using Rec. 601 weights.
    pub fn luma(&self) -> f32 {
        0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32
    }

    /// Parses `rrggbb` with an optional leading `#`.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TreeError::invalid(format!(
                "`{hex}` is not a six digit hex colour"
            )));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| TreeError::invalid(format!("`{hex}` is not a hex colour")))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// Converts a fully saturated hue to 8-bit RGB. Hues outside `[0, 1)` wrap.
pub fn hue_to_rgb(hue: f32) -> Rgb {
    hsv_to_rgb(hue, 1.0, 1.0)
}

/// HSV to 8-bit RGB with every component in `[0, 1]`.
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb {
    let (r, g, b) = if saturation <= 0.0 {
        (value, value, value)
    } else {
        let hue = hue.rem_euclid(1.0) * 6.0;
        let sector = hue.floor();
        let f = hue - sector;
        let p = value * (1.0 - saturation);
        let q = value * (1.0 - saturation * f);
        let t = value * (1.0 - saturation * (1.0 - f));
        match sector as u8 % 6 {
            0 => (value, t, p),
            1 => (q, value, p),
            2 => (p, value, t),
            3 => (p, q, value),
            4 => (t, p, value),
            _ => (value, p, q),
        }
    };
    let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0) as u8;
    Rgb::new(to_byte(r), to_byte(g), to_byte(b))
}
