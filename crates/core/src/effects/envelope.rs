use super::{
    ColorProposal, EffectCategory, EffectContext, EffectDescriptor, KnobSpec, ALL_CHANNELS,
    BACKGROUND_ONLY,
};
use crate::color::{clamp01, quantize01, smoothstep, Color};

pub(super) static EFFECTS: [EffectDescriptor; 8] = [
    EffectDescriptor {
        name: "bass_pulse",
        category: EffectCategory::Envelope,
        targets: ALL_CHANNELS,
        knobs: &BASS_PULSE_KNOBS,
        summary: "lightness and saturation lift following bass",
        eval: bass_pulse,
    },
    EffectDescriptor {
        name: "impact_flash",
        category: EffectCategory::Envelope,
        targets: ALL_CHANNELS,
        knobs: &IMPACT_FLASH_KNOBS,
        summary: "bright, slightly washed flash on loudness attacks",
        eval: impact_flash,
    },
    EffectDescriptor {
        name: "beat_toggle",
        category: EffectCategory::Envelope,
        targets: ALL_CHANNELS,
        knobs: &BEAT_TOGGLE_KNOBS,
        summary: "fixed hue jump while a beat is held",
        eval: beat_toggle,
    },
    EffectDescriptor {
        name: "treble_swing",
        category: EffectCategory::Envelope,
        targets: ALL_CHANNELS,
        knobs: &TREBLE_SWING_KNOBS,
        summary: "stepped hue swing following treble",
        eval: treble_swing,
    },
    EffectDescriptor {
        name: "saturation_gate",
        category: EffectCategory::Envelope,
        targets: ALL_CHANNELS,
        knobs: &SATURATION_GATE_KNOBS,
        summary: "stepped saturation following overall loudness",
        eval: saturation_gate,
    },
    EffectDescriptor {
        name: "inverted_loudness",
        category: EffectCategory::Envelope,
        targets: ALL_CHANNELS,
        knobs: &INVERTED_LOUDNESS_KNOBS,
        summary: "darkens as the music gets louder",
        eval: inverted_loudness,
    },
    EffectDescriptor {
        name: "saturation_breath",
        category: EffectCategory::Envelope,
        targets: ALL_CHANNELS,
        knobs: &SATURATION_BREATH_KNOBS,
        summary: "stepped saturation and slight lift following overall loudness",
        eval: saturation_breath,
    },
    EffectDescriptor {
        name: "bass_impact_tint",
        category: EffectCategory::Envelope,
        targets: BACKGROUND_ONLY,
        knobs: &BASS_IMPACT_KNOBS,
        summary: "saturated background hit on bass, sharpened by impacts",
        eval: bass_impact_tint,
    },
];

static BASS_PULSE_KNOBS: [KnobSpec; 2] = [
    KnobSpec::new("swing", 0.08, 0.0, 0.3, "lightness added at full bass"),
    KnobSpec::new("bloom", 0.35, 0.0, 1.5, "relative saturation gain at full bass"),
];

static IMPACT_FLASH_KNOBS: [KnobSpec; 2] = [
    KnobSpec::new("depth", 0.12, 0.0, 0.4, "lightness added at full impact"),
    KnobSpec::new("wash", 0.3, 0.0, 1.0, "saturation removed at full impact"),
];

static BEAT_TOGGLE_KNOBS: [KnobSpec; 1] = [KnobSpec::new(
    "shift",
    180.0,
    0.0,
    360.0,
    "hue offset in degrees while a beat is held",
)];

static TREBLE_SWING_KNOBS: [KnobSpec; 2] = [
    KnobSpec::new("degrees", 32.0, 0.0, 180.0, "hue offset at full treble"),
    KnobSpec::new("levels", 8.0, 2.0, 32.0, "quantization steps"),
];

static SATURATION_GATE_KNOBS: [KnobSpec; 3] = [
    KnobSpec::new("floor", 0.65, 0.0, 1.0, "saturation factor in silence"),
    KnobSpec::new("span", 0.55, 0.0, 2.0, "extra factor at full loudness"),
    KnobSpec::new("levels", 6.0, 2.0, 32.0, "quantization steps"),
];

static INVERTED_LOUDNESS_KNOBS: [KnobSpec; 2] = [
    KnobSpec::new("damp", 0.25, 0.0, 0.9, "lightness removed at full loudness"),
    KnobSpec::new("levels", 6.0, 2.0, 32.0, "quantization steps"),
];

static SATURATION_BREATH_KNOBS: [KnobSpec; 4] = [
    KnobSpec::new("floor", 0.70, 0.0, 1.0, "saturation factor in silence"),
    KnobSpec::new("span", 0.45, 0.0, 2.0, "extra factor at full loudness"),
    KnobSpec::new("lift", 0.04, 0.0, 0.2, "lightness added at full loudness"),
    KnobSpec::new("levels", 5.0, 2.0, 32.0, "quantization steps"),
];

static BASS_IMPACT_KNOBS: [KnobSpec; 3] = [
    KnobSpec::new("bloom", 1.0, 0.0, 2.0, "relative saturation gain at a full hit"),
    KnobSpec::new("swing", 0.10, 0.0, 0.3, "lightness added at a full hit"),
    KnobSpec::new("ceiling", 0.22, 0.0, 1.0, "highest lightness the hit may reach"),
];

fn levels(ctx: &EffectContext<'_>) -> u32 {
    ctx.knob("levels").round().max(2.0) as u32
}

/// With `a = smoothstep(bass)`:
/// `lightness = working.l + swing * a`,
/// `saturation = working.s * (1 + bloom * a)`.
fn bass_pulse(ctx: &EffectContext<'_>) -> ColorProposal {
    let amp = smoothstep(ctx.energy.bass);
    let w = ctx.working;
    ColorProposal::Absolute(Color::new(
        w.hue,
        w.saturation * (1.0 + ctx.knob("bloom") * amp),
        w.lightness + ctx.knob("swing") * amp,
    ))
}

/// With `a = smoothstep(impact)`:
/// `lightness = working.l + depth * a`,
/// `saturation = working.s * (1 - wash * a)`.
fn impact_flash(ctx: &EffectContext<'_>) -> ColorProposal {
    let amp = smoothstep(ctx.energy.impact);
    let w = ctx.working;
    ColorProposal::Absolute(Color::new(
        w.hue,
        w.saturation * (1.0 - ctx.knob("wash") * amp),
        w.lightness + ctx.knob("depth") * amp,
    ))
}

/// `hue += shift` while the beat flag is set, unchanged otherwise.
fn beat_toggle(ctx: &EffectContext<'_>) -> ColorProposal {
    if ctx.energy.beat() {
        ColorProposal::hue(ctx.knob("shift"))
    } else {
        ColorProposal::IDENTITY
    }
}

/// `hue += degrees * q(smoothstep(treble))` with `q` quantizing to `levels`.
fn treble_swing(ctx: &EffectContext<'_>) -> ColorProposal {
    let swing = quantize01(smoothstep(ctx.energy.treble), levels(ctx));
    ColorProposal::hue(ctx.knob("degrees") * swing)
}

/// `saturation *= floor + span * q(smoothstep(global))`.
fn saturation_gate(ctx: &EffectContext<'_>) -> ColorProposal {
    let gate = quantize01(smoothstep(ctx.energy.global), levels(ctx));
    ColorProposal::saturation(ctx.knob("floor") + ctx.knob("span") * gate)
}

/// With `d = q(smoothstep(global))`:
/// `lightness *= 1 - damp * d`, `saturation *= 0.85 + 0.15 * d`.
fn inverted_loudness(ctx: &EffectContext<'_>) -> ColorProposal {
    let damp = quantize01(smoothstep(ctx.energy.global), levels(ctx));
    ColorProposal::Delta {
        hue: 0.0,
        saturation: clamp01(0.85 + 0.15 * damp),
        lightness: 1.0 - ctx.knob("damp") * damp,
    }
}

/// With `b = q(smoothstep(global))`:
/// `saturation = working.s * (floor + span * b)`,
/// `lightness = 0.85 * working.l + 0.03 + lift * b`.
fn saturation_breath(ctx: &EffectContext<'_>) -> ColorProposal {
    let lift = quantize01(smoothstep(ctx.energy.global), levels(ctx));
    let w = ctx.working;
    ColorProposal::Absolute(Color::new(
        w.hue,
        w.saturation * (ctx.knob("floor") + ctx.knob("span") * lift),
        0.85 * w.lightness + 0.03 + ctx.knob("lift") * lift,
    ))
}

/// With `a = smoothstep(bass) * (0.55 + 0.45 * impact)`:
/// `saturation = working.s * (0.9 + bloom * a)`,
/// `lightness = min(0.8 * working.l + 0.03 + swing * a, ceiling)`.
fn bass_impact_tint(ctx: &EffectContext<'_>) -> ColorProposal {
    let hit = smoothstep(ctx.energy.bass) * (0.55 + 0.45 * clamp01(ctx.energy.impact));
    let w = ctx.working;
    let lightness = (0.8 * w.lightness + 0.03 + ctx.knob("swing") * hit).min(ctx.knob("ceiling"));
    ColorProposal::Absolute(Color::new(
        w.hue,
        w.saturation * (0.9 + ctx.knob("bloom") * hit),
        lightness,
    ))
}
