//! Colors and the active color state.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{CanvasError, CanvasResult};

/// A straight (non-premultiplied) RGBA color.
///
/// Serialized as a hex string (`#RRGGBB` or `#RRGGBBAA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    /// Fully transparent.
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    /// Create an opaque color.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Create a color with alpha.
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidOperation`] if the string is not a hex color.
    pub fn from_hex(hex: &str) -> CanvasResult<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || CanvasError::InvalidOperation(format!("invalid hex color: {hex}"));
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        match digits.len() {
            3 => {
                let nibble = |i: usize| {
                    u8::from_str_radix(&digits[i..=i], 16)
                        .map(|v| v * 17)
                        .map_err(|_| invalid())
                };
                Ok(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            6 => Ok(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Self::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(invalid()),
        }
    }

    /// Format as `#RRGGBB`, or `#RRGGBBAA` when not opaque.
    #[must_use]
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }

    /// Same color with a different alpha.
    #[must_use]
    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Convert to HSV: hue in degrees [0, 360), saturation and value in [0, 1].
    #[must_use]
    pub fn to_hsv(&self) -> (f32, f32, f32) {
        let r = f32::from(self.r) / 255.0;
        let g = f32::from(self.g) / 255.0;
        let b = f32::from(self.b) / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta <= f32::EPSILON {
            0.0
        } else if (max - r).abs() <= f32::EPSILON {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if (max - g).abs() <= f32::EPSILON {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
        (hue.rem_euclid(360.0), saturation, max)
    }

    /// Build an opaque color from HSV.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_hsv(hue: f32, saturation: f32, value: f32) -> Self {
        let h = hue.rem_euclid(360.0) / 60.0;
        let s = saturation.clamp(0.0, 1.0);
        let v = value.clamp(0.0, 1.0);
        let c = v * s;
        let x = c * (1.0 - (h.rem_euclid(2.0) - 1.0).abs());
        let m = v - c;
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let to_u8 = |f: f32| ((f + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::rgb(to_u8(r), to_u8(g), to_u8(b))
    }

    /// Convert to a tiny-skia color.
    #[must_use]
    pub fn to_skia(&self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_hex()
    }
}

impl TryFrom<String> for Color {
    type Error = CanvasError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Primary/secondary colors plus a bounded recent-colors history.
#[derive(Debug, Clone)]
pub struct ColorManager {
    primary: Color,
    secondary: Color,
    recent: VecDeque<Color>,
    max_recent: usize,
}

impl ColorManager {
    /// Create with black primary, white secondary and the given history size.
    #[must_use]
    pub fn new(max_recent: usize) -> Self {
        Self {
            primary: Color::BLACK,
            secondary: Color::WHITE,
            recent: VecDeque::with_capacity(max_recent),
            max_recent,
        }
    }

    /// Current primary (foreground) color.
    #[must_use]
    pub const fn primary(&self) -> Color {
        self.primary
    }

    /// Current secondary (background) color.
    #[must_use]
    pub const fn secondary(&self) -> Color {
        self.secondary
    }

    /// Set the primary color.
    pub fn set_primary(&mut self, color: Color) {
        self.primary = color;
    }

    /// Set the secondary color.
    pub fn set_secondary(&mut self, color: Color) {
        self.secondary = color;
    }

    /// Swap primary and secondary.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.primary, &mut self.secondary);
    }

    /// Record a color as used. Moves duplicates to the front; drops the oldest past capacity.
    pub fn push_recent(&mut self, color: Color) {
        if self.max_recent == 0 {
            return;
        }
        self.recent.retain(|c| *c != color);
        self.recent.push_front(color);
        self.recent.truncate(self.max_recent);
    }

    /// Recently used colors, most recent first.
    pub fn recent(&self) -> impl Iterator<Item = &Color> {
        self.recent.iter()
    }
}

impl Default for ColorManager {
    fn default() -> Self {
        Self::new(16)
    }
}
