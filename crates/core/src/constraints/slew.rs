use serde::{Deserialize, Serialize};

use crate::color::{hue_difference, Color, ColorFrame};
use crate::{PulseError, Result};

/// Largest change allowed per emitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlewLimits {
    /// Degrees, along the shorter arc.
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
}

impl Default for SlewLimits {
    fn default() -> Self {
        Self {
            hue: 12.0,
            saturation: 0.08,
            lightness: 0.05,
        }
    }
}

impl SlewLimits {
    pub fn validate(&self) -> Result<()> {
        let ok = |v: f32| v.is_finite() && v > 0.0;
        if !ok(self.hue) || !ok(self.saturation) || !ok(self.lightness) {
            return Err(PulseError::config("slew limits must be positive"));
        }
        Ok(())
    }
}

/// Caps per-frame movement relative to the last emitted frame.
#[derive(Debug, Clone)]
pub struct SlewLimiter {
    limits: SlewLimits,
    last: Option<ColorFrame>,
}

impl SlewLimiter {
    pub fn new(limits: SlewLimits) -> Self {
        Self { limits, last: None }
    }

    pub fn seeded(limits: SlewLimits, start: ColorFrame) -> Self {
        Self {
            limits,
            last: Some(start),
        }
    }

    pub fn set_limits(&mut self, limits: SlewLimits) {
        self.limits = limits;
    }

    pub fn last(&self) -> Option<&ColorFrame> {
        self.last.as_ref()
    }

    /// Forgets the last frame; the next call passes its target through.
    pub fn clear(&mut self) {
        self.last = None;
    }

    /// Moves each channel toward `target` by at most the configured limits.
    /// Protected entries are limited too: one that is already at its baseline
    /// stays there exactly, one that is not glides back.
    pub fn limit(&mut self, target: ColorFrame) -> ColorFrame {
        let out = match self.last {
            None => target,
            Some(previous) => {
                target.map(|channel, goal| step(previous.get(channel), goal, &self.limits))
            }
        };
        self.last = Some(out);
        out
    }
}

fn approach(from: f32, to: f32, max_step: f32) -> f32 {
    let diff = to - from;
    if diff.abs() <= max_step {
        to
    } else {
        from + max_step.copysign(diff)
    }
}

fn step(from: Color, to: Color, limits: &SlewLimits) -> Color {
    let arc = hue_difference(from.hue, to.hue);
    let hue = if arc.abs() <= limits.hue {
        to.hue
    } else {
        from.hue + limits.hue.copysign(arc)
    };
    Color::new(
        hue,
        approach(from.saturation, to.saturation, limits.saturation),
        approach(from.lightness, to.lightness, limits.lightness),
    )
}
