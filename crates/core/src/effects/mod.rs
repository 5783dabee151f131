//! Library of pure color effects.
//!
//! An effect is a plain function from an [`EffectContext`] to a
//! [`ColorProposal`]. Effects hold no state between calls: anything that
//! evolves over time (envelopes, the playback clock) is passed in through the
//! context, so the same inputs always give the same color.

mod envelope;
mod oscillator;
mod palette;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::EnergyState;
use crate::color::{Channel, ChannelKind, Color};
use crate::{PulseError, Result};

/// What an effect wants the working color to become.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorProposal {
    /// Replace the working color outright.
    Absolute(Color),
    /// Adjust the working color: hue is added (degrees), saturation and
    /// lightness are multiplied.
    Delta {
        hue: f32,
        saturation: f32,
        lightness: f32,
    },
}

impl ColorProposal {
    pub const IDENTITY: ColorProposal = ColorProposal::Delta {
        hue: 0.0,
        saturation: 1.0,
        lightness: 1.0,
    };

    pub fn hue(degrees: f32) -> Self {
        ColorProposal::Delta {
            hue: degrees,
            saturation: 1.0,
            lightness: 1.0,
        }
    }

    pub fn saturation(factor: f32) -> Self {
        ColorProposal::Delta {
            hue: 0.0,
            saturation: factor,
            lightness: 1.0,
        }
    }

    pub fn lightness(factor: f32) -> Self {
        ColorProposal::Delta {
            hue: 0.0,
            saturation: 1.0,
            lightness: factor,
        }
    }

    /// Resolves the proposal against the current working color. The result
    /// is always a normalised, in-range [`Color`].
    pub fn apply(self, working: Color) -> Color {
        match self {
            ColorProposal::Absolute(color) => {
                Color::new(color.hue, color.saturation, color.lightness)
            }
            ColorProposal::Delta {
                hue,
                saturation,
                lightness,
            } => Color::new(
                working.hue + hue,
                working.saturation * saturation,
                working.lightness * lightness,
            ),
        }
    }
}

/// Broad family an effect belongs to. Used for listing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectCategory {
    Oscillator,
    Envelope,
    Noise,
    Spectral,
}

impl fmt::Display for EffectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectCategory::Oscillator => "oscillator",
            EffectCategory::Envelope => "envelope",
            EffectCategory::Noise => "noise",
            EffectCategory::Spectral => "spectral",
        };
        f.write_str(name)
    }
}

/// A named numeric parameter with its default and inclusive valid range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnobSpec {
    pub name: &'static str,
    pub default: f32,
    pub min: f32,
    pub max: f32,
    pub summary: &'static str,
}

impl KnobSpec {
    pub const fn new(
        name: &'static str,
        default: f32,
        min: f32,
        max: f32,
        summary: &'static str,
    ) -> Self {
        Self {
            name,
            default,
            min,
            max,
            summary,
        }
    }

    pub fn contains(&self, value: f32) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// Resolved knob values for one use of an effect.
#[derive(Debug, Clone, PartialEq)]
pub struct KnobValues {
    specs: &'static [KnobSpec],
    values: Vec<f32>,
}

impl KnobValues {
    pub fn defaults(specs: &'static [KnobSpec]) -> Self {
        Self {
            specs,
            values: specs.iter().map(|spec| spec.default).collect(),
        }
    }

    /// Overrides one knob, rejecting unknown names and out-of-range values.
    pub fn set(&mut self, name: &str, value: f32) -> Result<()> {
        let index = self
            .specs
            .iter()
            .position(|spec| spec.name == name)
            .ok_or_else(|| PulseError::config(format!("unknown knob `{name}`")))?;
        let spec = &self.specs[index];
        if !spec.contains(value) {
            return Err(PulseError::config(format!(
                "knob `{name}` = {value} is outside {}..={}",
                spec.min, spec.max
            )));
        }
        self.values[index] = value;
        Ok(())
    }

    /// Current value of `name`, or 0 for a name the effect never declared.
    pub fn get(&self, name: &str) -> f32 {
        self.specs
            .iter()
            .position(|spec| spec.name == name)
            .map(|index| self.values[index])
            .unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        self.specs
            .iter()
            .zip(&self.values)
            .map(|(spec, &value)| (spec.name, value))
    }
}

/// Everything an effect may read.
#[derive(Debug, Clone, Copy)]
pub struct EffectContext<'a> {
    pub channel: Channel,
    /// Output of the previous layer on this channel (baseline for the first).
    pub working: Color,
    /// Captured baseline for this channel.
    pub baseline: Color,
    /// Background as composed for this frame. For the background channel
    /// itself this is the working color.
    pub background: Color,
    pub energy: &'a EnergyState,
    /// Seconds since the scene started.
    pub elapsed: f32,
    pub knobs: &'a KnobValues,
}

impl EffectContext<'_> {
    pub fn knob(&self, name: &str) -> f32 {
        self.knobs.get(name)
    }

    /// Palette index for palette channels.
    pub fn palette_index(&self) -> Option<u8> {
        match self.channel {
            Channel::Palette(index) => Some(index),
            _ => None,
        }
    }
}

pub type EffectFn = fn(&EffectContext<'_>) -> ColorProposal;

/// Static description of a shipped effect.
pub struct EffectDescriptor {
    pub name: &'static str,
    pub category: EffectCategory,
    /// Channel kinds this effect may be layered on.
    pub targets: &'static [ChannelKind],
    pub knobs: &'static [KnobSpec],
    pub summary: &'static str,
    pub eval: EffectFn,
}

impl EffectDescriptor {
    pub fn supports(&self, kind: ChannelKind) -> bool {
        self.targets.contains(&kind)
    }

    pub fn default_knobs(&self) -> KnobValues {
        KnobValues::defaults(self.knobs)
    }

    pub fn evaluate(&self, ctx: &EffectContext<'_>) -> Color {
        (self.eval)(ctx).apply(ctx.working)
    }
}

impl fmt::Debug for EffectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

pub(crate) const ALL_CHANNELS: &[ChannelKind] = &[
    ChannelKind::Foreground,
    ChannelKind::Background,
    ChannelKind::Palette,
];
pub(crate) const PALETTE_ONLY: &[ChannelKind] = &[ChannelKind::Palette];
pub(crate) const FOREGROUND_ONLY: &[ChannelKind] = &[ChannelKind::Foreground];
pub(crate) const BACKGROUND_ONLY: &[ChannelKind] = &[ChannelKind::Background];

/// Lookup table of every shipped effect.
#[derive(Debug, Clone)]
pub struct EffectRegistry {
    effects: Vec<&'static EffectDescriptor>,
}

impl EffectRegistry {
    pub fn builtin() -> Self {
        let effects = oscillator::EFFECTS
            .iter()
            .chain(envelope::EFFECTS.iter())
            .chain(palette::EFFECTS.iter())
            .collect();
        Self { effects }
    }

    pub fn get(&self, name: &str) -> Option<&'static EffectDescriptor> {
        self.effects.iter().copied().find(|effect| effect.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&'static EffectDescriptor> {
        self.get(name)
            .ok_or_else(|| PulseError::config(format!("unknown effect `{name}`")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static EffectDescriptor> + '_ {
        self.effects.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Phase of a periodic signal in radians.
pub(crate) fn phase(elapsed: f32, period: f32) -> f32 {
    if period <= 0.0 {
        return 0.0;
    }
    std::f32::consts::TAU * (elapsed / period).fract()
}
