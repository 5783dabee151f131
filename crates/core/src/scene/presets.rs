use super::LayerTarget::{Background, Foreground, Indices, Palette};
use super::{LayerDescriptor, SceneDescriptor};
use crate::constraints::{ConstraintSettings, Protection, SlewLimits};

fn scene(
    name: &str,
    description: &str,
    layers: Vec<LayerDescriptor>,
    constraints: ConstraintSettings,
) -> SceneDescriptor {
    SceneDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        layers,
        constraints,
    }
}

fn constraints(min_contrast: f32, max_bg: f32, max_fg_sat: f32) -> ConstraintSettings {
    ConstraintSettings {
        min_contrast,
        max_background_lightness: max_bg,
        max_foreground_saturation: max_fg_sat,
        ..ConstraintSettings::default()
    }
}

pub(super) fn builtin_scenes() -> Vec<SceneDescriptor> {
    vec![
        scene(
            "mood",
            "bass lifts the background, text tints with the spectrum",
            vec![
                LayerDescriptor::new(Background, "bass_pulse"),
                LayerDescriptor::new(Foreground, "spectrum_tint"),
                LayerDescriptor::new(Palette, "spectrum_map"),
            ],
            constraints(0.22, 0.18, 0.85),
        ),
        scene(
            "punchy",
            "hard bass hits with impact flashes",
            vec![
                LayerDescriptor::new(Background, "bass_impact_tint"),
                LayerDescriptor::new(Foreground, "contrast_follow"),
                LayerDescriptor::new(Palette, "spectrum_map"),
                LayerDescriptor::new(Palette, "chromatic_bloom"),
            ],
            ConstraintSettings {
                slew: SlewLimits {
                    hue: 18.0,
                    saturation: 0.12,
                    lightness: 0.08,
                },
                ..constraints(0.26, 0.17, 0.80)
            },
        ),
        scene(
            "spectrum",
            "every palette entry shows one band",
            vec![
                LayerDescriptor::new(Background, "bass_pulse"),
                LayerDescriptor::new(Foreground, "contrast_follow"),
                LayerDescriptor::new(Palette, "spectrum_map"),
            ],
            ConstraintSettings {
                protection: Protection::None,
                ..constraints(0.24, 0.18, 0.85)
            },
        ),
        scene(
            "warmcool",
            "warm lean on bass, cool lean on treble",
            vec![
                LayerDescriptor::new(Background, "temperature_shift")
                    .knob("warm", 20.0)
                    .knob("cool", 40.0),
                LayerDescriptor::new(Foreground, "saturation_gate"),
                LayerDescriptor::new(Palette, "temperature_shift"),
            ],
            constraints(0.24, 0.20, 0.85),
        ),
        scene(
            "focus",
            "quiet and low saturation; louder music dims the background",
            vec![
                LayerDescriptor::new(Background, "inverted_loudness"),
                LayerDescriptor::new(Foreground, "saturation_gate")
                    .knob("floor", 0.25)
                    .knob("span", 0.75)
                    .knob("levels", 7.0),
                LayerDescriptor::new(Palette, "gamma_wave"),
            ],
            ConstraintSettings {
                preserve_order: true,
                ..constraints(0.26, 0.16, 0.75)
            },
        ),
        scene(
            "danger",
            "reds pulse with bass, greens with mids; everything else stays put",
            vec![
                LayerDescriptor::new(Background, "bass_pulse").knob("swing", 0.04),
                LayerDescriptor::new(Indices(vec![1, 2, 9, 10]), "danger_success"),
            ],
            constraints(0.22, 0.18, 0.85),
        ),
        scene(
            "drift",
            "slow time-driven wander with loudness-driven role rotation",
            vec![
                LayerDescriptor::new(Background, "noise_drift").knob("depth", 20.0),
                LayerDescriptor::new(Foreground, "hue_drift")
                    .knob("period", 45.0)
                    .knob("depth", 30.0),
                LayerDescriptor::new(Palette, "role_hue_rotate"),
                LayerDescriptor::new(Palette, "noise_drift")
                    .knob("depth", 15.0)
                    .knob("speed", 0.03),
            ],
            ConstraintSettings {
                protection: Protection::Adaptive {
                    enter: 0.08,
                    exit: 0.12,
                },
                preserve_order: true,
                ..constraints(0.22, 0.18, 0.85)
            },
        ),
    ]
}
