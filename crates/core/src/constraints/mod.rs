//! Safety passes run on every composed frame before it is encoded.
//!
//! Pass order is fixed: caps, protected anchoring, contrast, lightness-order
//! preservation, idle handling, then slew limiting. The limiter runs last so
//! its memory always holds what was actually emitted.

mod passes;
mod slew;

use serde::{Deserialize, Serialize};

use crate::analysis::ActivitySignal;
use crate::color::{Channel, ColorFrame, PALETTE_SIZE};
use crate::config::IdleConfig;
use crate::{PulseError, Result};

pub use passes::{
    anchor_protected, apply_caps, enforce_contrast, idle_weight, preserve_order, AdaptiveProtector,
    CONTRAST_EPSILON,
};
pub use slew::{SlewLimiter, SlewLimits};

/// Largest accepted minimum contrast. Any background lightness leaves room
/// for this distance on at least one side.
pub const MAX_MIN_CONTRAST: f32 = 0.45;

/// What happens once the input has been silent for the configured duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleMode {
    /// Blend back to the baseline over the blend duration.
    #[default]
    Fade,
    /// Freeze the last emitted colors.
    Hold,
    /// Target the baseline at once, without the fade ramp. The slew limiter
    /// still paces the way back.
    Reset,
}

/// Which palette indices are pinned to their baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Protection {
    None,
    Static { indices: Vec<u8> },
    /// Protects indices whose baseline lightness is within `enter` of the
    /// current background, releasing them only once the distance exceeds
    /// `exit`.
    Adaptive { enter: f32, exit: f32 },
}

impl Protection {
    pub fn standard() -> Self {
        Protection::Static {
            indices: vec![0, 7, 8, 15],
        }
    }
}

impl Default for Protection {
    fn default() -> Self {
        Self::standard()
    }
}

/// Per-scene constraint parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSettings {
    pub protection: Protection,
    /// Minimum lightness distance between any color and the background.
    pub min_contrast: f32,
    pub max_background_lightness: f32,
    pub max_foreground_saturation: f32,
    pub preserve_order: bool,
    pub slew: SlewLimits,
}

impl Default for ConstraintSettings {
    fn default() -> Self {
        Self {
            protection: Protection::standard(),
            min_contrast: 0.22,
            max_background_lightness: 0.18,
            max_foreground_saturation: 0.85,
            preserve_order: false,
            slew: SlewLimits::default(),
        }
    }
}

impl ConstraintSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_MIN_CONTRAST).contains(&self.min_contrast) {
            return Err(PulseError::config(format!(
                "min_contrast must be within 0..={MAX_MIN_CONTRAST}, got {}",
                self.min_contrast
            )));
        }
        for (name, value) in [
            ("max_background_lightness", self.max_background_lightness),
            ("max_foreground_saturation", self.max_foreground_saturation),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PulseError::config(format!(
                    "{name} must be within 0..=1, got {value}"
                )));
            }
        }
        match &self.protection {
            Protection::None => {}
            Protection::Static { indices } => {
                if let Some(bad) = indices.iter().find(|&&i| i as usize >= PALETTE_SIZE) {
                    return Err(PulseError::config(format!(
                        "protected index {bad} is outside 0..{PALETTE_SIZE}"
                    )));
                }
            }
            Protection::Adaptive { enter, exit } => {
                if !(0.0 <= *enter && enter < exit && *exit <= 1.0) {
                    return Err(PulseError::config(format!(
                        "adaptive protection needs 0 <= enter < exit <= 1, got {enter}/{exit}"
                    )));
                }
            }
        }
        self.slew.validate()
    }
}

/// The full constraint chain plus the state it carries between frames.
#[derive(Debug, Clone)]
pub struct ConstraintPipeline {
    settings: ConstraintSettings,
    idle: IdleConfig,
    baseline: ColorFrame,
    adaptive: AdaptiveProtector,
    protected: [bool; PALETTE_SIZE],
    limiter: SlewLimiter,
}

impl ConstraintPipeline {
    pub fn new(settings: ConstraintSettings, idle: IdleConfig, baseline: ColorFrame) -> Self {
        let limiter = SlewLimiter::seeded(settings.slew, baseline);
        Self {
            settings,
            idle,
            baseline,
            adaptive: AdaptiveProtector::default(),
            protected: [false; PALETTE_SIZE],
            limiter,
        }
    }

    pub fn settings(&self) -> &ConstraintSettings {
        &self.settings
    }

    /// Installs another scene's settings. The limiter memory is kept unless
    /// `keep_memory` is false, in which case the next frame lands unlimited.
    pub fn switch(&mut self, settings: ConstraintSettings, keep_memory: bool) {
        self.limiter.set_limits(settings.slew);
        if !keep_memory {
            self.limiter.clear();
        }
        self.adaptive = AdaptiveProtector::default();
        self.settings = settings;
    }

    pub fn last_emitted(&self) -> Option<&ColorFrame> {
        self.limiter.last()
    }

    /// Palette indices protected on the most recent frame.
    pub fn protected(&self) -> [bool; PALETTE_SIZE] {
        self.protected
    }

    pub fn apply(&mut self, proposed: ColorFrame, activity: ActivitySignal) -> ColorFrame {
        let mut frame = proposed;

        apply_caps(&mut frame, &self.settings);
        let protected = match &self.settings.protection {
            Protection::None => [false; PALETTE_SIZE],
            Protection::Static { indices } => static_mask(indices),
            Protection::Adaptive { enter, exit } => {
                self.adaptive
                    .update(&self.baseline, frame.background, *enter, *exit)
            }
        };
        self.protected = protected;

        anchor_protected(&mut frame, &self.baseline, &protected);
        enforce_contrast(&mut frame, &self.baseline, self.settings.min_contrast, &protected);
        if self.settings.preserve_order {
            preserve_order(&mut frame, &self.baseline, self.settings.min_contrast, &protected);
        }

        let silent = activity.idle_seconds > self.idle.silence_seconds;
        match self.idle.mode {
            IdleMode::Hold if silent => {
                if let Some(last) = self.limiter.last() {
                    return *last;
                }
            }
            IdleMode::Reset if silent => frame = self.baseline,
            _ => {
                let weight = idle_weight(
                    activity.idle_seconds,
                    self.idle.silence_seconds,
                    self.idle.blend_seconds,
                );
                if weight > 0.0 {
                    blend_toward(&mut frame, &self.baseline, weight);
                }
            }
        }

        self.limiter.limit(frame)
    }
}

fn static_mask(indices: &[u8]) -> [bool; PALETTE_SIZE] {
    let mut mask = [false; PALETTE_SIZE];
    for &i in indices {
        if let Some(slot) = mask.get_mut(i as usize) {
            *slot = true;
        }
    }
    mask
}

fn blend_toward(frame: &mut ColorFrame, baseline: &ColorFrame, weight: f32) {
    for channel in Channel::all() {
        let target = baseline.get(channel);
        let blended = if weight >= 1.0 {
            target
        } else {
            frame.get(channel).mix(target, weight)
        };
        frame.set(channel, blended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    fn baseline() -> ColorFrame {
        let mut frame = ColorFrame::splat(Color::new(0.0, 0.6, 0.55));
        frame.background = Color::new(220.0, 0.5, 0.10);
        frame.foreground = Color::new(0.0, 0.0, 0.82);
        frame
    }

    fn idle(seconds: f32) -> ActivitySignal {
        ActivitySignal {
            activity: 0.0,
            idle_seconds: seconds,
        }
    }

    #[test]
    fn settings_validation_rejects_bad_values() {
        ConstraintSettings::default().validate().unwrap();
        let mut s = ConstraintSettings::default();
        s.min_contrast = 0.6;
        assert!(s.validate().is_err());
        let mut s = ConstraintSettings::default();
        s.protection = Protection::Static { indices: vec![3, 16] };
        assert!(s.validate().is_err());
        let mut s = ConstraintSettings::default();
        s.protection = Protection::Adaptive { enter: 0.2, exit: 0.1 };
        assert!(s.validate().is_err());
    }

    #[test]
    fn protection_parses_from_json() {
        let p: Protection = serde_json::from_str(r#"{"mode":"static","indices":[1,9]}"#).unwrap();
        assert_eq!(p, Protection::Static { indices: vec![1, 9] });
        let p: Protection = serde_json::from_str(r#"{"mode":"adaptive","enter":0.1,"exit":0.15}"#).unwrap();
        assert!(matches!(p, Protection::Adaptive { .. }));
        let p: Protection = serde_json::from_str(r#"{"mode":"none"}"#).unwrap();
        assert_eq!(p, Protection::None);
    }

    #[test]
    fn bass_pulse_scenario_needs_two_frames_under_slew() {
        let mut settings = ConstraintSettings::default();
        settings.max_background_lightness = 1.0;
        settings.slew.lightness = 0.05;
        let mut pipeline = ConstraintPipeline::new(settings, IdleConfig::default(), baseline());

        let mut target = baseline();
        target.background = target.background.with_lightness(0.18);

        let first = pipeline.apply(target, idle(0.0));
        assert!((first.background.lightness - 0.15).abs() < 1e-5);
        let second = pipeline.apply(target, idle(0.0));
        assert!((second.background.lightness - 0.18).abs() < 1e-5);
    }

    #[test]
    fn fade_returns_to_baseline_after_silence() {
        let mut pipeline =
            ConstraintPipeline::new(ConstraintSettings::default(), IdleConfig::default(), baseline());
        let mut target = baseline();
        target.foreground = Color::new(120.0, 0.7, 0.7);
        for _ in 0..30 {
            pipeline.apply(target, idle(0.0));
        }
        let mut out = target;
        for step in 0..200 {
            out = pipeline.apply(target, idle(0.6 + step as f32 * 0.05));
        }
        assert_eq!(out, baseline());
    }

    #[test]
    fn hold_freezes_and_reset_heads_home_under_slew() {
        let mut target = baseline();
        target.foreground = Color::new(120.0, 0.7, 0.7);

        let hold = IdleConfig {
            mode: IdleMode::Hold,
            ..IdleConfig::default()
        };
        let mut pipeline = ConstraintPipeline::new(ConstraintSettings::default(), hold, baseline());
        let last = pipeline.apply(target, idle(0.0));
        let mut moved = target;
        moved.foreground = Color::new(300.0, 0.2, 0.9);
        assert_eq!(pipeline.apply(moved, idle(5.0)), last);

        let reset = IdleConfig {
            mode: IdleMode::Reset,
            ..IdleConfig::default()
        };
        let limits = ConstraintSettings::default().slew;
        let mut pipeline = ConstraintPipeline::new(ConstraintSettings::default(), reset, baseline());
        let mut previous = baseline();
        for _ in 0..30 {
            previous = pipeline.apply(target, idle(0.0));
        }
        let first = pipeline.apply(target, idle(5.0));
        let dl = (first.foreground.lightness - previous.foreground.lightness).abs();
        assert!(dl <= limits.lightness + 1e-6);
        assert_ne!(first, baseline());

        let mut out = first;
        for _ in 0..40 {
            out = pipeline.apply(target, idle(5.0));
        }
        assert_eq!(out, baseline());
    }

    #[test]
    fn entering_adaptive_protection_glides_back() {
        let mut base = baseline();
        base.palette[3] = Color::new(30.0, 0.6, 0.30);
        let settings = ConstraintSettings {
            protection: Protection::Adaptive {
                enter: 0.08,
                exit: 0.12,
            },
            max_background_lightness: 1.0,
            ..ConstraintSettings::default()
        };
        let limits = settings.slew;
        let mut pipeline = ConstraintPipeline::new(settings, IdleConfig::default(), base);

        let mut target = base;
        target.palette[3] = Color::new(30.0, 0.6, 0.70);
        let mut previous = base;
        for _ in 0..20 {
            previous = pipeline.apply(target, idle(0.0));
        }
        assert!(!pipeline.protected()[3]);
        assert!((previous.palette[3].lightness - 0.70).abs() < 1e-5);

        // The background moves next to index 3, which becomes protected.
        target.background = Color::new(220.0, 0.5, 0.26);
        for _ in 0..20 {
            let out = pipeline.apply(target, idle(0.0));
            assert!(pipeline.protected()[3]);
            let step = (out.palette[3].lightness - previous.palette[3].lightness).abs();
            assert!(step <= limits.lightness + 1e-6, "stepped {step}");
            previous = out;
        }
        assert_eq!(previous.palette[3], base.palette[3]);
    }

    #[test]
    fn jump_switch_lands_immediately() {
        let mut pipeline =
            ConstraintPipeline::new(ConstraintSettings::default(), IdleConfig::default(), baseline());
        let mut target = baseline();
        target.foreground = Color::new(0.0, 0.0, 0.4);
        let glided = pipeline.apply(target, idle(0.0));
        assert!(glided.foreground.lightness > 0.4);

        pipeline.switch(ConstraintSettings::default(), false);
        let landed = pipeline.apply(target, idle(0.0));
        assert!((landed.foreground.lightness - 0.4).abs() < 1e-6);
    }
}
