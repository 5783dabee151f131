use super::Scene;
use crate::analysis::EnergyState;
use crate::color::{Channel, Color, ColorFrame};
use crate::effects::EffectContext;

/// Folds a scene's layers over the baseline, one channel at a time.
///
/// The background is composed first so foreground and palette effects can
/// read this frame's background. Channels no layer addresses keep their
/// baseline color.
#[derive(Debug, Clone)]
pub struct SceneComposer {
    scene: Scene,
}

impl SceneComposer {
    pub fn new(scene: Scene) -> Self {
        Self { scene }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn set_scene(&mut self, scene: Scene) {
        self.scene = scene;
    }

    pub fn compose(&self, baseline: &ColorFrame, energy: &EnergyState, elapsed: f32) -> ColorFrame {
        let mut frame = *baseline;
        frame.background = self.fold(Channel::Background, baseline, None, energy, elapsed);
        let background = frame.background;
        for channel in Channel::all().filter(|c| *c != Channel::Background) {
            let color = self.fold(channel, baseline, Some(background), energy, elapsed);
            frame.set(channel, color);
        }
        frame
    }

    fn fold(
        &self,
        channel: Channel,
        baseline: &ColorFrame,
        background: Option<Color>,
        energy: &EnergyState,
        elapsed: f32,
    ) -> Color {
        let base = baseline.get(channel);
        self.scene
            .layers_for(channel)
            .fold(base, |working, layer| {
                let ctx = EffectContext {
                    channel,
                    working,
                    baseline: base,
                    background: background.unwrap_or(working),
                    energy,
                    elapsed,
                    knobs: &layer.knobs,
                };
                layer.effect.evaluate(&ctx)
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::constraints::ConstraintSettings;
    use crate::effects::EffectRegistry;
    use crate::scene::{LayerDescriptor, LayerTarget, SceneDescriptor, SceneLibrary};

    fn baseline() -> ColorFrame {
        let mut frame = ColorFrame::splat(Color::new(10.0, 0.6, 0.5));
        frame.background = Color::new(220.0, 0.5, 0.10);
        frame
    }

    fn composer(descriptor: &SceneDescriptor) -> SceneComposer {
        SceneComposer::new(
            descriptor
                .resolve(&EffectRegistry::builtin(), &BTreeMap::new())
                .unwrap(),
        )
    }

    fn loud() -> EnergyState {
        EnergyState {
            bass: 1.0,
            mid: 1.0,
            treble: 1.0,
            global: 1.0,
            impact: 1.0,
            bands: [1.0; crate::analysis::SUMMARY_BANDS],
        }
    }

    #[test]
    fn unaddressed_indices_keep_their_baseline() {
        let library = SceneLibrary::builtin();
        let danger = composer(library.require("danger").unwrap());
        let out = danger.compose(&baseline(), &loud(), 1.0);
        for i in [0usize, 3, 4, 5, 6, 7, 8, 11, 12, 13, 14, 15] {
            assert_eq!(out.palette[i], baseline().palette[i], "index {i}");
        }
        assert_eq!(out.foreground, baseline().foreground);
        assert_ne!(out.palette[1], baseline().palette[1]);
        assert_ne!(out.palette[10], baseline().palette[10]);
    }

    #[test]
    fn later_layers_see_earlier_output() {
        let descriptor = SceneDescriptor {
            name: "stack".into(),
            description: String::new(),
            layers: vec![
                LayerDescriptor::new(LayerTarget::Background, "bass_pulse"),
                LayerDescriptor::new(LayerTarget::Background, "bass_pulse"),
            ],
            constraints: ConstraintSettings::default(),
        };
        let out = composer(&descriptor).compose(&baseline(), &loud(), 0.0);
        assert!((out.background.lightness - 0.26).abs() < 1e-5);
    }

    #[test]
    fn silence_leaves_bass_pulse_at_baseline() {
        let library = SceneLibrary::builtin();
        let mood = composer(library.require("mood").unwrap());
        let out = mood.compose(&baseline(), &EnergyState::silent(), 0.0);
        assert_eq!(out.background, baseline().background);
    }

    #[test]
    fn foreground_effects_read_the_composed_background() {
        let descriptor = SceneDescriptor {
            name: "follow".into(),
            description: String::new(),
            layers: vec![
                LayerDescriptor::new(LayerTarget::Background, "bass_pulse").knob("swing", 0.2),
                LayerDescriptor::new(LayerTarget::Foreground, "contrast_follow"),
            ],
            constraints: ConstraintSettings::default(),
        };
        let c = composer(&descriptor);
        let quiet = c.compose(&baseline(), &EnergyState::silent(), 0.0);
        let mut bassy = EnergyState::silent();
        bassy.bass = 1.0;
        let loud = c.compose(&baseline(), &bassy, 0.0);
        assert!(loud.foreground.lightness > quiet.foreground.lightness);
    }

    #[test]
    fn danger_greens_answer_mids_not_bass() {
        let library = SceneLibrary::builtin();
        let danger = composer(library.require("danger").unwrap());
        let mut bass = EnergyState::silent();
        bass.bass = 1.0;
        let mut mids = EnergyState::silent();
        mids.mid = 1.0;

        let quiet = danger.compose(&baseline(), &EnergyState::silent(), 0.0);
        let on_bass = danger.compose(&baseline(), &bass, 0.0);
        let on_mids = danger.compose(&baseline(), &mids, 0.0);
        for i in [2usize, 10] {
            assert_eq!(on_bass.palette[i], quiet.palette[i], "index {i}");
            assert!(on_mids.palette[i].lightness > quiet.palette[i].lightness);
            assert!(on_mids.palette[i].saturation > quiet.palette[i].saturation);
        }
        for i in [1usize, 9] {
            assert!(on_bass.palette[i].lightness > quiet.palette[i].lightness);
            assert_eq!(on_mids.palette[i], quiet.palette[i], "index {i}");
        }
    }
}
