use super::{
    ColorProposal, EffectCategory, EffectContext, EffectDescriptor, KnobSpec, ALL_CHANNELS,
    FOREGROUND_ONLY, PALETTE_ONLY,
};
use crate::color::{clamp01, quantize01, smoothstep, Color, PALETTE_SIZE};

pub(super) static EFFECTS: [EffectDescriptor; 9] = [
    EffectDescriptor {
        name: "role_hue_rotate",
        category: EffectCategory::Spectral,
        targets: ALL_CHANNELS,
        knobs: &ROLE_HUE_KNOBS,
        summary: "rotates chromatic colors around their own hue with loudness",
        eval: role_hue_rotate,
    },
    EffectDescriptor {
        name: "chromatic_bloom",
        category: EffectCategory::Spectral,
        targets: ALL_CHANNELS,
        knobs: &BLOOM_KNOBS,
        summary: "saturation bloom on impacts, chromatic colors only",
        eval: chromatic_bloom,
    },
    EffectDescriptor {
        name: "temperature_shift",
        category: EffectCategory::Spectral,
        targets: ALL_CHANNELS,
        knobs: &TEMPERATURE_KNOBS,
        summary: "warm hue lean on bass, cool lean on treble",
        eval: temperature_shift,
    },
    EffectDescriptor {
        name: "spectrum_map",
        category: EffectCategory::Spectral,
        targets: PALETTE_ONLY,
        knobs: &SPECTRUM_MAP_KNOBS,
        summary: "palette index i shows summary band i as a fixed hue",
        eval: spectrum_map,
    },
    EffectDescriptor {
        name: "spectrum_tint",
        category: EffectCategory::Spectral,
        targets: ALL_CHANNELS,
        knobs: &SPECTRUM_TINT_KNOBS,
        summary: "hue follows the spectral centroid",
        eval: spectrum_tint,
    },
    EffectDescriptor {
        name: "contrast_follow",
        category: EffectCategory::Spectral,
        targets: FOREGROUND_ONLY,
        knobs: &CONTRAST_FOLLOW_KNOBS,
        summary: "centroid hue with lightness tracking the composed background",
        eval: contrast_follow,
    },
    EffectDescriptor {
        name: "gamma_wave",
        category: EffectCategory::Spectral,
        targets: ALL_CHANNELS,
        knobs: &GAMMA_WAVE_KNOBS,
        summary: "lightness gamma that steepens with loudness",
        eval: gamma_wave,
    },
    EffectDescriptor {
        name: "complement_sparkle",
        category: EffectCategory::Spectral,
        targets: ALL_CHANNELS,
        knobs: &SPARKLE_KNOBS,
        summary: "treble pulls each hue part way toward its complement",
        eval: complement_sparkle,
    },
    EffectDescriptor {
        name: "danger_success",
        category: EffectCategory::Spectral,
        targets: PALETTE_ONLY,
        knobs: &DANGER_SUCCESS_KNOBS,
        summary: "reds (1, 9) follow bass, greens (2, 10) follow mids",
        eval: danger_success,
    },
];

static ROLE_HUE_KNOBS: [KnobSpec; 2] = [
    KnobSpec::new("degrees", 24.0, 0.0, 180.0, "hue rotation at full loudness"),
    KnobSpec::new("chroma_floor", 0.12, 0.0, 1.0, "saturation below which a color is left alone"),
];

static BLOOM_KNOBS: [KnobSpec; 2] = [
    KnobSpec::new("bloom", 0.5, 0.0, 2.0, "relative saturation gain at full impact"),
    KnobSpec::new("chroma_floor", 0.12, 0.0, 1.0, "saturation below which a color is left alone"),
];

static TEMPERATURE_KNOBS: [KnobSpec; 3] = [
    KnobSpec::new("warm", 22.0, 0.0, 90.0, "hue offset when bass dominates"),
    KnobSpec::new("cool", 28.0, 0.0, 90.0, "hue offset (negative) when treble dominates"),
    KnobSpec::new("levels", 7.0, 2.0, 32.0, "quantization steps"),
];

static SPECTRUM_MAP_KNOBS: [KnobSpec; 5] = [
    KnobSpec::new("span", 300.0, 0.0, 360.0, "hue range covered by indices 0..15"),
    KnobSpec::new("saturation", 0.80, 0.0, 1.0, "base saturation"),
    KnobSpec::new("floor", 0.18, 0.0, 1.0, "lightness of a silent band"),
    KnobSpec::new("range", 0.52, 0.0, 1.0, "lightness added by a full band"),
    KnobSpec::new("levels", 7.0, 2.0, 32.0, "quantization steps"),
];

static SPECTRUM_TINT_KNOBS: [KnobSpec; 3] = [
    KnobSpec::new("span", 300.0, 0.0, 360.0, "hue range swept by the centroid"),
    KnobSpec::new("bloom", 0.55, 0.0, 2.0, "saturation gain at full treble"),
    KnobSpec::new("levels", 12.0, 2.0, 64.0, "quantization steps"),
];

static CONTRAST_FOLLOW_KNOBS: [KnobSpec; 4] = [
    KnobSpec::new("base", 0.62, 0.0, 1.0, "lightness over a 0.12 background"),
    KnobSpec::new("follow", 0.35, 0.0, 1.0, "share of background lightness change followed"),
    KnobSpec::new("lift", 0.10, 0.0, 0.4, "lightness added at full loudness"),
    KnobSpec::new("span", 300.0, 0.0, 360.0, "hue range swept by the centroid"),
];

static GAMMA_WAVE_KNOBS: [KnobSpec; 3] = [
    KnobSpec::new("low", 0.90, 0.2, 3.0, "gamma in silence"),
    KnobSpec::new("span", 0.35, 0.0, 2.0, "gamma added at full loudness"),
    KnobSpec::new("levels", 6.0, 2.0, 32.0, "quantization steps"),
];

static SPARKLE_KNOBS: [KnobSpec; 2] = [
    KnobSpec::new("reach", 0.18, 0.0, 0.5, "share of the way to the complement at full treble"),
    KnobSpec::new("levels", 5.0, 2.0, 32.0, "quantization steps"),
];

static DANGER_SUCCESS_KNOBS: [KnobSpec; 3] = [
    KnobSpec::new("red_lift", 0.25, 0.0, 0.6, "lightness gain of reds at full bass"),
    KnobSpec::new("green_lift", 0.22, 0.0, 0.6, "lightness gain of greens at full mids"),
    KnobSpec::new("levels", 6.0, 2.0, 32.0, "quantization steps"),
];

/// Palette entries that carry error and success roles.
const RED_INDICES: [u8; 2] = [1, 9];
const GREEN_INDICES: [u8; 2] = [2, 10];

fn levels(ctx: &EffectContext<'_>) -> u32 {
    ctx.knob("levels").round().max(2.0) as u32
}

fn is_chromatic(ctx: &EffectContext<'_>) -> bool {
    ctx.baseline.saturation >= ctx.knob("chroma_floor")
}

/// `hue += degrees * smoothstep(global)` for colors whose baseline saturation
/// reaches `chroma_floor`. The rotation is relative to each color's own hue,
/// so red stays reddish and green greenish.
fn role_hue_rotate(ctx: &EffectContext<'_>) -> ColorProposal {
    if !is_chromatic(ctx) {
        return ColorProposal::IDENTITY;
    }
    ColorProposal::hue(ctx.knob("degrees") * smoothstep(ctx.energy.global))
}

/// `saturation *= 1 + bloom * smoothstep(impact)` for chromatic colors.
fn chromatic_bloom(ctx: &EffectContext<'_>) -> ColorProposal {
    if !is_chromatic(ctx) {
        return ColorProposal::IDENTITY;
    }
    ColorProposal::saturation(1.0 + ctx.knob("bloom") * smoothstep(ctx.energy.impact))
}

/// With `w = q((bass - treble) / 2 + 1/2)`:
/// `hue += -cool + (warm + cool) * w`.
fn temperature_shift(ctx: &EffectContext<'_>) -> ColorProposal {
    let warmth = quantize01((ctx.energy.bass - ctx.energy.treble) * 0.5 + 0.5, levels(ctx));
    let (warm, cool) = (ctx.knob("warm"), ctx.knob("cool"));
    ColorProposal::hue(-cool + (warm + cool) * warmth)
}

/// Absolute color for palette index `i`:
/// `hue = span * i / 15`, `saturation = saturation + (1 - saturation) * impact`,
/// `lightness = floor + range * q(band[i])`.
fn spectrum_map(ctx: &EffectContext<'_>) -> ColorProposal {
    let Some(index) = ctx.palette_index() else {
        return ColorProposal::IDENTITY;
    };
    let i = (index as usize).min(PALETTE_SIZE - 1);
    let band = quantize01(ctx.energy.bands[i], levels(ctx));
    let base_sat = ctx.knob("saturation");
    ColorProposal::Absolute(Color::new(
        ctx.knob("span") * i as f32 / (PALETTE_SIZE - 1) as f32,
        base_sat + (1.0 - base_sat) * ctx.energy.impact,
        ctx.knob("floor") + ctx.knob("range") * band,
    ))
}

/// `hue = span * q(centroid)`, `saturation = working.s * (0.85 + bloom *
/// smoothstep(treble))`, lightness unchanged.
fn spectrum_tint(ctx: &EffectContext<'_>) -> ColorProposal {
    let hue = ctx.knob("span") * quantize01(ctx.energy.centroid(), levels(ctx));
    let w = ctx.working;
    ColorProposal::Absolute(Color::new(
        hue,
        w.saturation * (0.85 + ctx.knob("bloom") * smoothstep(ctx.energy.treble)),
        w.lightness,
    ))
}

/// `hue = span * q12(centroid)`,
/// `lightness = base + follow * (bg.l - 0.12) + lift * smoothstep(global)`,
/// `saturation = working.s * (0.9 + 0.15 * smoothstep(global))`.
fn contrast_follow(ctx: &EffectContext<'_>) -> ColorProposal {
    let intensity = smoothstep(ctx.energy.global);
    let hue = ctx.knob("span") * quantize01(ctx.energy.centroid(), 12);
    let lightness = clamp01(
        ctx.knob("base")
            + ctx.knob("follow") * (ctx.background.lightness - 0.12)
            + ctx.knob("lift") * intensity,
    );
    ColorProposal::Absolute(Color::new(
        hue,
        ctx.working.saturation * (0.9 + 0.15 * intensity),
        lightness,
    ))
}

/// With `g = low + span * q(smoothstep(global))`:
/// `lightness = max(working.l, 1e-4) ^ g`. Above 1 darkens the mid tones,
/// below 1 lifts them; black and white stay put.
fn gamma_wave(ctx: &EffectContext<'_>) -> ColorProposal {
    let step = quantize01(smoothstep(ctx.energy.global), levels(ctx));
    let gamma = ctx.knob("low") + ctx.knob("span") * step;
    let w = ctx.working;
    ColorProposal::Absolute(Color::new(
        w.hue,
        w.saturation,
        w.lightness.max(1e-4).powf(gamma),
    ))
}

/// `hue += 180 * reach * q(smoothstep(treble))`.
fn complement_sparkle(ctx: &EffectContext<'_>) -> ColorProposal {
    let sparkle = quantize01(smoothstep(ctx.energy.treble), levels(ctx));
    ColorProposal::hue(180.0 * ctx.knob("reach") * sparkle)
}

/// Reds, with `d = q(smoothstep(bass))`:
/// `saturation *= 0.8 + 0.5 * d`, `lightness *= 0.9 + red_lift * d`.
/// Greens, with `g = q(smoothstep(mid))`:
/// `saturation *= 0.8 + 0.4 * g`, `lightness *= 0.92 + green_lift * g`.
/// Every other index is left alone.
fn danger_success(ctx: &EffectContext<'_>) -> ColorProposal {
    let Some(index) = ctx.palette_index() else {
        return ColorProposal::IDENTITY;
    };
    if RED_INDICES.contains(&index) {
        let d = quantize01(smoothstep(ctx.energy.bass), levels(ctx));
        ColorProposal::Delta {
            hue: 0.0,
            saturation: 0.8 + 0.5 * d,
            lightness: 0.9 + ctx.knob("red_lift") * d,
        }
    } else if GREEN_INDICES.contains(&index) {
        let g = quantize01(smoothstep(ctx.energy.mid), levels(ctx));
        ColorProposal::Delta {
            hue: 0.0,
            saturation: 0.8 + 0.4 * g,
            lightness: 0.92 + ctx.knob("green_lift") * g,
        }
    } else {
        ColorProposal::IDENTITY
    }
}
