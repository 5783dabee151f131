use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use palette_pulse_core::analysis::{ActivitySignal, BandExtractor, BandLayout, EnergyState};
use palette_pulse_core::baseline::{BaselineManager, RestoreOutcome, TerminalIo};
use palette_pulse_core::color::{Channel, Color, ColorFrame};
use palette_pulse_core::config::{AppConfig, BandsConfig, IdleConfig};
use palette_pulse_core::constraints::{ConstraintPipeline, ConstraintSettings, Protection, SlewLimits};
use palette_pulse_core::effects::{EffectContext, EffectRegistry};
use palette_pulse_core::render::{query_sequence, ChannelMask, FrameWriter, Terminator, TerminatorMode};
use palette_pulse_core::{Engine, SceneLibrary, SpectrumFrame};
use proptest::prelude::*;

const DT: f32 = 0.05;

/// Answers queries sent with one terminator, each channel with a fixed spec.
struct EchoTerminal {
    specs: BTreeMap<Vec<u8>, String>,
}

impl EchoTerminal {
    fn new(terminator: Terminator, specs: &[String]) -> Self {
        let specs = Channel::all()
            .zip(specs)
            .map(|(channel, spec)| (query_sequence(channel, terminator), spec.clone()))
            .collect();
        Self { specs }
    }
}

impl TerminalIo for EchoTerminal {
    fn query(&mut self, request: &[u8], _timeout: Duration) -> io::Result<Vec<u8>> {
        let Some(spec) = self.specs.get(request) else {
            return Ok(Vec::new());
        };
        // The reply echoes the request with `?` swapped for the color.
        let text = String::from_utf8_lossy(request).replace('?', spec);
        Ok(text.into_bytes())
    }
}

fn spec_strategy() -> impl Strategy<Value = String> {
    (1usize..=4, any::<[u16; 3]>()).prop_map(|(width, parts)| {
        let mask = if width == 4 { u16::MAX } else { (1u16 << (4 * width)) - 1 };
        let hex: Vec<String> = parts
            .iter()
            .map(|part| format!("{:0width$x}", part & mask, width = width))
            .collect();
        format!("rgb:{}", hex.join("/"))
    })
}

fn expected_restore(terminator: Terminator, specs: &[String]) -> Vec<u8> {
    let end = terminator.as_bytes();
    let mut out = Vec::new();
    for (code, spec) in [("10", &specs[0]), ("11", &specs[1])] {
        out.extend_from_slice(b"\x1b]");
        out.extend_from_slice(format!("{code};{spec}").as_bytes());
        out.extend_from_slice(end);
    }
    let palette: Vec<String> = specs[2..]
        .iter()
        .enumerate()
        .map(|(i, spec)| format!("{i};{spec}"))
        .collect();
    out.extend_from_slice(b"\x1b]4;");
    out.extend_from_slice(palette.join(";").as_bytes());
    out.extend_from_slice(end);
    out
}

fn spectrum(value: u8) -> SpectrumFrame {
    SpectrumFrame::from_u8(&[value; 64])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn restore_replays_the_captured_replies_byte_for_byte(
        specs in proptest::collection::vec(spec_strategy(), 18),
        st in any::<bool>(),
        scene_index in 0usize..7,
        loudness in proptest::collection::vec(any::<u8>(), 1..40),
    ) {
        let terminator = if st { Terminator::St } else { Terminator::Bel };
        let config = AppConfig::default();
        let mut terminal = EchoTerminal::new(terminator, &specs);
        let mut manager = BaselineManager::new();
        let captured = manager
            .capture(Some(&mut terminal), &config.baseline, TerminatorMode::Auto)
            .clone();
        prop_assert_eq!(captured.terminator(), terminator);

        let library = SceneLibrary::builtin();
        let names: Vec<&str> = library.names().collect();
        let name = names[scene_index % names.len()];
        let scene = library
            .require(name)
            .unwrap()
            .resolve(&EffectRegistry::builtin(), &BTreeMap::new())
            .unwrap();
        let mut engine = Engine::new(&config, scene, captured.colors());
        let mut writer = FrameWriter::new(
            Vec::new(),
            terminator,
            ChannelMask::ALL,
            config.output.min_rgb_delta,
            *captured.rgb(),
        );
        for level in loudness {
            let colors = engine.tick(Some(&spectrum(level)), DT);
            writer.write_frame(&colors).unwrap();
        }

        let mut restored = Vec::new();
        prop_assert_eq!(manager.restore(&mut restored), RestoreOutcome::Restored);
        prop_assert_eq!(restored, expected_restore(terminator, &specs));
        prop_assert_eq!(manager.restore(&mut Vec::<u8>::new()), RestoreOutcome::AlreadyRestored);
    }

    #[test]
    fn silence_returns_every_scene_to_baseline(
        scene_index in 0usize..7,
        loud_frames in 1usize..40,
        level in 64u8..=255,
    ) {
        let config = AppConfig::default();
        let library = SceneLibrary::builtin();
        let names: Vec<&str> = library.names().collect();
        let name = names[scene_index % names.len()];
        let scene = library
            .require(name)
            .unwrap()
            .resolve(&EffectRegistry::builtin(), &BTreeMap::new())
            .unwrap();
        let baseline = palette_pulse_core::CapturedBaseline::fallback(&config.baseline, Terminator::Bel)
            .colors();
        let mut engine = Engine::new(&config, scene, baseline);

        for _ in 0..loud_frames {
            engine.tick(Some(&spectrum(level)), DT);
        }
        let mut last = engine.tick(Some(&spectrum(0)), DT);
        // Energy decay, idle detection, the blend itself and the final slew.
        for _ in 0..400 {
            last = engine.tick(Some(&spectrum(0)), DT);
        }
        for channel in Channel::all() {
            let (got, want) = (last.get(channel), baseline.get(channel));
            prop_assert!(got.distance(want) < 1e-4, "{name} {channel}: {got:?} vs {want:?}");
        }
    }
}

#[test]
fn all_zero_spectrum_has_zero_energy() {
    let extractor = BandExtractor::new(BandLayout::new(64, &BandsConfig::default()));
    let raw = extractor.extract(&spectrum(0));
    assert_eq!((raw.bass, raw.mid, raw.treble), (0.0, 0.0, 0.0));
    assert_eq!(raw.global, 0.0);
}

#[test]
fn bass_pulse_needs_two_slewed_frames_to_reach_its_target() {
    let background = Color::new(220.0, 0.5, 0.10);
    let baseline = ColorFrame {
        foreground: Color::new(0.0, 0.0, 0.85),
        background,
        palette: [Color::new(0.0, 0.0, 0.7); 16],
    };

    let effect = EffectRegistry::builtin().require("bass_pulse").unwrap();
    let knobs = effect.default_knobs();
    let energy = EnergyState {
        bass: 1.0,
        ..EnergyState::silent()
    };
    let target = effect.evaluate(&EffectContext {
        channel: Channel::Background,
        working: background,
        baseline: background,
        background,
        energy: &energy,
        elapsed: 0.0,
        knobs: &knobs,
    });
    assert!((target.lightness - 0.18).abs() < 1e-4);

    let settings = ConstraintSettings {
        protection: Protection::None,
        slew: SlewLimits {
            lightness: 0.05,
            ..SlewLimits::default()
        },
        ..ConstraintSettings::default()
    };
    let mut pipeline = ConstraintPipeline::new(settings, IdleConfig::default(), baseline);
    let loud = ActivitySignal {
        activity: 1.0,
        idle_seconds: 0.0,
    };
    let proposed = ColorFrame {
        background: target,
        ..baseline
    };

    let first = pipeline.apply(proposed, loud);
    assert!(first.background.lightness < 0.18 - 1e-3);
    assert!((first.background.lightness - 0.15).abs() < 1e-4);
    let second = pipeline.apply(proposed, loud);
    assert!((second.background.lightness - 0.18).abs() < 1e-4);
}
