use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

use noise::{NoiseFn, Perlin};

use super::{
    phase, ColorProposal, EffectCategory, EffectContext, EffectDescriptor, KnobSpec, ALL_CHANNELS,
};
use crate::color::PALETTE_SIZE;

pub(super) static EFFECTS: [EffectDescriptor; 3] = [
    EffectDescriptor {
        name: "hue_drift",
        category: EffectCategory::Oscillator,
        targets: ALL_CHANNELS,
        knobs: &HUE_DRIFT_KNOBS,
        summary: "slow sinusoidal hue cycle around the working hue",
        eval: hue_drift,
    },
    EffectDescriptor {
        name: "lightness_breath",
        category: EffectCategory::Oscillator,
        targets: ALL_CHANNELS,
        knobs: &BREATH_KNOBS,
        summary: "periodic lightness breathing",
        eval: lightness_breath,
    },
    EffectDescriptor {
        name: "noise_drift",
        category: EffectCategory::Noise,
        targets: ALL_CHANNELS,
        knobs: &NOISE_KNOBS,
        summary: "bounded Perlin hue wander, continuous in time",
        eval: noise_drift,
    },
];

static HUE_DRIFT_KNOBS: [KnobSpec; 3] = [
    KnobSpec::new("period", 30.0, 1.0, 600.0, "seconds per full cycle"),
    KnobSpec::new("depth", 40.0, 0.0, 180.0, "peak hue offset in degrees"),
    KnobSpec::new("spread", 0.0, 0.0, 1.0, "phase spread across palette indices"),
];

static BREATH_KNOBS: [KnobSpec; 2] = [
    KnobSpec::new("period", 8.0, 0.5, 120.0, "seconds per breath"),
    KnobSpec::new("depth", 0.06, 0.0, 0.5, "relative lightness swing"),
];

static NOISE_KNOBS: [KnobSpec; 3] = [
    KnobSpec::new("speed", 0.05, 0.001, 2.0, "noise lattice cells per second"),
    KnobSpec::new("depth", 30.0, 0.0, 120.0, "peak hue offset in degrees"),
    KnobSpec::new("seed", 7.0, 0.0, 65535.0, "noise seed"),
];

/// Samples averaged by `noise_drift`, spaced this many seconds apart.
const NOISE_TAPS: [f32; 3] = [0.0, 0.25, 0.5];

/// Generators by seed. Building one shuffles a permutation table, so each
/// seed is built once per process.
static PERLIN: OnceLock<Mutex<HashMap<u32, Perlin>>> = OnceLock::new();

fn with_perlin<R>(seed: u32, f: impl FnOnce(&Perlin) -> R) -> R {
    let cache = PERLIN.get_or_init(Default::default);
    // A poisoned cache still holds fully built generators.
    let mut generators = cache.lock().unwrap_or_else(PoisonError::into_inner);
    f(generators.entry(seed).or_insert_with(|| Perlin::new(seed)))
}

fn index_offset(ctx: &EffectContext<'_>, spread: f32) -> f32 {
    ctx.palette_index()
        .map(|i| spread * std::f32::consts::TAU * i as f32 / PALETTE_SIZE as f32)
        .unwrap_or(0.0)
}

/// `hue += depth * sin(2π t / period + spread * 2π i / 16)` where `i` is the
/// palette index (0 for foreground and background).
fn hue_drift(ctx: &EffectContext<'_>) -> ColorProposal {
    let theta = phase(ctx.elapsed, ctx.knob("period")) + index_offset(ctx, ctx.knob("spread"));
    ColorProposal::hue(ctx.knob("depth") * theta.sin())
}

/// `lightness *= 1 + depth * sin(2π t / period)`.
fn lightness_breath(ctx: &EffectContext<'_>) -> ColorProposal {
    let theta = phase(ctx.elapsed, ctx.knob("period"));
    ColorProposal::lightness(1.0 + ctx.knob("depth") * theta.sin())
}

/// `hue += depth * n(t)` where `n` is Perlin noise along time, averaged over
/// a short trailing window and clamped to `[-1, 1]`. Each channel samples its
/// own row of the noise field so palette entries wander independently.
fn noise_drift(ctx: &EffectContext<'_>) -> ColorProposal {
    let row = match ctx.palette_index() {
        Some(index) => 2.0 + index as f64,
        None if ctx.channel == crate::color::Channel::Background => 1.0,
        None => 0.0,
    };
    let speed = ctx.knob("speed") as f64;
    let sum: f64 = with_perlin(ctx.knob("seed") as u32, |perlin| {
        NOISE_TAPS
            .iter()
            .map(|&lag| {
                let t = (ctx.elapsed - lag).max(0.0) as f64 * speed;
                perlin.get([t, row + 0.5])
            })
            .sum()
    });
    let n = (sum / NOISE_TAPS.len() as f64).clamp(-1.0, 1.0) as f32;
    ColorProposal::hue(ctx.knob("depth") * n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EnergyState;
    use crate::color::{Channel, Color};
    use crate::effects::test_support::context;
    use crate::effects::EffectRegistry;

    fn eval(name: &str, channel: Channel, elapsed: f32) -> Color {
        let effect = EffectRegistry::builtin().require(name).unwrap();
        let knobs = effect.default_knobs();
        let energy = EnergyState::silent();
        let ctx = context(channel, Color::new(100.0, 0.5, 0.5), &energy, elapsed, &knobs);
        effect.evaluate(&ctx)
    }

    #[test]
    fn hue_drift_follows_the_clock_not_the_audio() {
        let start = eval("hue_drift", Channel::Foreground, 0.0);
        assert!((start.hue - 100.0).abs() < 1e-3);
        let quarter = eval("hue_drift", Channel::Foreground, 7.5);
        assert!((quarter.hue - 140.0).abs() < 1e-2);
        let full = eval("hue_drift", Channel::Foreground, 30.0);
        assert!((full.hue - 100.0).abs() < 1e-2);
    }

    #[test]
    fn breathing_stays_within_depth() {
        for step in 0..80 {
            let color = eval("lightness_breath", Channel::Background, step as f32 * 0.1);
            assert!(color.lightness >= 0.5 * 0.94 - 1e-6);
            assert!(color.lightness <= 0.5 * 1.06 + 1e-6);
        }
    }

    #[test]
    fn noise_is_bounded_and_continuous() {
        let mut previous = eval("noise_drift", Channel::Palette(3), 0.0).hue;
        for step in 1..400 {
            let hue = eval("noise_drift", Channel::Palette(3), step as f32 * 0.05).hue;
            let offset = crate::color::hue_difference(100.0, hue);
            assert!(offset.abs() <= 30.0 + 1e-3);
            assert!(crate::color::hue_difference(previous, hue).abs() < 2.0);
            previous = hue;
        }
    }

    #[test]
    fn cached_generators_match_fresh_ones() {
        for seed in [0u32, 7, 4242] {
            let point = [12.3, 4.5];
            let cached = with_perlin(seed, |perlin| perlin.get(point));
            assert_eq!(cached, Perlin::new(seed).get(point));
            assert_eq!(with_perlin(seed, |perlin| perlin.get(point)), cached);
        }
    }
}
