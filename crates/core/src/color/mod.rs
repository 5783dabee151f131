//! Perceptual color model shared by every stage of the engine.
//!
//! All modulation happens on [`Color`] (hue/saturation/lightness). The only
//! conversion to device RGB is [`Color::to_rgb`], called by the encoder.

mod channel;

use std::fmt;

use palette::{FromColor, Hsl, Srgb};
use serde::{Deserialize, Serialize};

use crate::{PulseError, Result};

pub use channel::{Channel, ChannelKind, ChannelMap, ColorFrame, PALETTE_SIZE};

/// A color in HSL space: hue in degrees `[0, 360)`, saturation and lightness
/// in `[0, 1]`. Constructors normalise, so a `Color` is always in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
}

impl Color {
    pub fn new(hue: f32, saturation: f32, lightness: f32) -> Self {
        Self {
            hue: wrap_hue(hue),
            saturation: clamp01(saturation),
            lightness: clamp01(lightness),
        }
    }

    pub fn from_rgb(rgb: Rgb8) -> Self {
        let srgb = Srgb::new(
            rgb.r as f32 / 255.0,
            rgb.g as f32 / 255.0,
            rgb.b as f32 / 255.0,
        );
        let hsl: Hsl = Hsl::from_color(srgb);
        Self::new(
            hsl.hue.into_positive_degrees(),
            hsl.saturation,
            hsl.lightness,
        )
    }

    /// One-way conversion to an 8-bit device triple.
    pub fn to_rgb(self) -> Rgb8 {
        let hsl: Hsl = Hsl::new(self.hue, self.saturation, self.lightness);
        let srgb: Srgb = Srgb::from_color(hsl);
        Rgb8::new(
            unit_to_byte(srgb.red),
            unit_to_byte(srgb.green),
            unit_to_byte(srgb.blue),
        )
    }

    pub fn with_hue(self, hue: f32) -> Self {
        Self::new(hue, self.saturation, self.lightness)
    }

    pub fn with_saturation(self, saturation: f32) -> Self {
        Self::new(self.hue, saturation, self.lightness)
    }

    pub fn with_lightness(self, lightness: f32) -> Self {
        Self::new(self.hue, self.saturation, lightness)
    }

    pub fn rotate(self, degrees: f32) -> Self {
        self.with_hue(self.hue + degrees)
    }

    /// Interpolates toward `other`, taking the shorter way around the hue
    /// circle. `t` is clamped to `[0, 1]`.
    pub fn mix(self, other: Color, t: f32) -> Self {
        let t = clamp01(t);
        Self::new(
            self.hue + hue_difference(self.hue, other.hue) * t,
            self.saturation + (other.saturation - self.saturation) * t,
            self.lightness + (other.lightness - self.lightness) * t,
        )
    }

    /// Largest per-component distance, with hue scaled to `[0, 1]` by 180°.
    pub fn distance(self, other: Color) -> f32 {
        let hue = hue_difference(self.hue, other.hue).abs() / 180.0;
        hue.max((self.saturation - other.saturation).abs())
            .max((self.lightness - other.lightness).abs())
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// Device-level color, 8 bits per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(value: &str) -> Result<Self> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PulseError::config(format!(
                "expected a #rrggbb color, got `{value}`"
            )));
        }
        let component = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|err| PulseError::config(format!("bad color `{value}`: {err}")))
        };
        Ok(Self::new(component(0..2)?, component(2..4)?, component(4..6)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Largest absolute difference over the three components.
    pub fn max_component_delta(self, other: Rgb8) -> u8 {
        let d = |a: u8, b: u8| a.abs_diff(b);
        d(self.r, other.r).max(d(self.g, other.g)).max(d(self.b, other.b))
    }
}

impl fmt::Display for Rgb8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Rgb8 {
    type Error = PulseError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<Rgb8> for String {
    fn from(value: Rgb8) -> Self {
        value.to_hex()
    }
}

pub fn clamp01(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Cubic ease with zero slope at both ends; input is clamped first.
pub fn smoothstep(x: f32) -> f32 {
    let x = clamp01(x);
    x * x * (3.0 - 2.0 * x)
}

/// Snaps `x` to one of `levels` evenly spaced steps including 0 and 1.
pub fn quantize01(x: f32, levels: u32) -> f32 {
    let x = clamp01(x);
    if levels <= 1 {
        return if x >= 0.5 { 1.0 } else { 0.0 };
    }
    let steps = (levels - 1) as f32;
    clamp01((x * steps).round() / steps)
}

/// Signed shortest arc from `from` to `to`, in `(-180, 180]`.
pub fn hue_difference(from: f32, to: f32) -> f32 {
    let diff = (to - from).rem_euclid(360.0);
    if diff > 180.0 {
        diff - 360.0
    } else {
        diff
    }
}

fn wrap_hue(hue: f32) -> f32 {
    if !hue.is_finite() {
        return 0.0;
    }
    let wrapped = hue.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

fn unit_to_byte(x: f32) -> u8 {
    (clamp01(x) * 255.0).round() as u8
}
