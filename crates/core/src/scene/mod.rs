//! Scenes: named stacks of effects per channel plus constraint settings.

mod composer;
mod presets;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::color::{Channel, ChannelKind, PALETTE_SIZE};
use crate::constraints::ConstraintSettings;
use crate::effects::{EffectDescriptor, EffectRegistry, KnobValues};
use crate::{PulseError, Result};

pub use composer::SceneComposer;

/// How a mid-run scene switch treats the colors on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchMode {
    /// Glide from the currently displayed colors into the new scene.
    #[default]
    Reseed,
    /// Show the new scene's first frame immediately.
    Jump,
}

/// Channels a layer is applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerTarget {
    Foreground,
    Background,
    /// All 16 palette entries.
    Palette,
    /// A subset of palette entries.
    Indices(Vec<u8>),
}

impl LayerTarget {
    pub fn kind(&self) -> ChannelKind {
        match self {
            LayerTarget::Foreground => ChannelKind::Foreground,
            LayerTarget::Background => ChannelKind::Background,
            LayerTarget::Palette | LayerTarget::Indices(_) => ChannelKind::Palette,
        }
    }

    pub fn covers(&self, channel: Channel) -> bool {
        match (self, channel) {
            (LayerTarget::Foreground, Channel::Foreground) => true,
            (LayerTarget::Background, Channel::Background) => true,
            (LayerTarget::Palette, Channel::Palette(_)) => true,
            (LayerTarget::Indices(indices), Channel::Palette(i)) => indices.contains(&i),
            _ => false,
        }
    }
}

impl fmt::Display for LayerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerTarget::Foreground => f.write_str("foreground"),
            LayerTarget::Background => f.write_str("background"),
            LayerTarget::Palette => f.write_str("palette"),
            LayerTarget::Indices(indices) => write!(f, "palette{indices:?}"),
        }
    }
}

/// One effect applied to one target, as written in a scene file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub target: LayerTarget,
    pub effect: String,
    #[serde(default)]
    pub knobs: BTreeMap<String, f32>,
}

impl LayerDescriptor {
    pub fn new(target: LayerTarget, effect: &str) -> Self {
        Self {
            target,
            effect: effect.to_string(),
            knobs: BTreeMap::new(),
        }
    }

    pub fn knob(mut self, name: &str, value: f32) -> Self {
        self.knobs.insert(name.to_string(), value);
        self
    }
}

/// Static scene data, either built in or loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub layers: Vec<LayerDescriptor>,
    #[serde(default)]
    pub constraints: ConstraintSettings,
}

impl SceneDescriptor {
    /// Checks every layer against `registry` and bakes knob values.
    ///
    /// `overrides` are keyed `effect.knob` and apply to every layer using that
    /// effect. Overrides naming an effect this scene does not use are still
    /// checked, so a typo fails even before the scene that needs it is active.
    pub fn resolve(
        &self,
        registry: &EffectRegistry,
        overrides: &BTreeMap<String, f32>,
    ) -> Result<Scene> {
        let scene_err = |detail: String| PulseError::config(format!("scene `{}`: {detail}", self.name));

        self.constraints
            .validate()
            .map_err(|err| scene_err(err.to_string()))?;

        let mut parsed_overrides = Vec::with_capacity(overrides.len());
        for (key, &value) in overrides {
            let (effect_name, knob) = key.split_once('.').ok_or_else(|| {
                PulseError::config(format!("knob override `{key}` must be written as effect.knob"))
            })?;
            let effect = registry.require(effect_name)?;
            // Validates the knob name and range against the effect itself.
            effect
                .default_knobs()
                .set(knob, value)
                .map_err(|err| PulseError::config(format!("override `{key}`: {err}")))?;
            parsed_overrides.push((effect_name, knob, value));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let effect = registry
                .require(&layer.effect)
                .map_err(|err| scene_err(err.to_string()))?;
            if !effect.supports(layer.target.kind()) {
                return Err(scene_err(format!(
                    "effect `{}` cannot target {}",
                    effect.name, layer.target
                )));
            }
            if let LayerTarget::Indices(indices) = &layer.target {
                if indices.is_empty() {
                    return Err(scene_err(format!("`{}` has an empty index set", effect.name)));
                }
                if let Some(bad) = indices.iter().find(|&&i| i as usize >= PALETTE_SIZE) {
                    return Err(scene_err(format!(
                        "palette index {bad} is outside 0..{PALETTE_SIZE}"
                    )));
                }
            }

            let mut knobs = effect.default_knobs();
            for (name, &value) in &layer.knobs {
                knobs
                    .set(name, value)
                    .map_err(|err| scene_err(format!("{}: {err}", effect.name)))?;
            }
            for &(effect_name, knob, value) in &parsed_overrides {
                if effect_name == effect.name {
                    knobs.set(knob, value)?;
                }
            }

            layers.push(Layer {
                target: layer.target.clone(),
                effect,
                knobs,
            });
        }

        Ok(Scene {
            name: self.name.clone(),
            layers,
            constraints: self.constraints.clone(),
        })
    }
}

/// A layer with its effect looked up and knobs resolved.
#[derive(Debug, Clone)]
pub struct Layer {
    pub target: LayerTarget,
    pub effect: &'static EffectDescriptor,
    pub knobs: KnobValues,
}

/// A validated scene ready to compose frames.
#[derive(Debug, Clone)]
pub struct Scene {
    pub name: String,
    pub layers: Vec<Layer>,
    pub constraints: ConstraintSettings,
}

impl Scene {
    /// Layers that apply to `channel`, in scene order.
    pub fn layers_for(&self, channel: Channel) -> impl Iterator<Item = &Layer> + '_ {
        self.layers
            .iter()
            .filter(move |layer| layer.target.covers(channel))
    }

    pub fn touches(&self, channel: Channel) -> bool {
        self.layers_for(channel).next().is_some()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SceneFile {
    One(SceneDescriptor),
    Many(Vec<SceneDescriptor>),
}

/// Every scene known to this run, keyed by name.
#[derive(Debug, Clone)]
pub struct SceneLibrary {
    scenes: BTreeMap<String, SceneDescriptor>,
}

impl SceneLibrary {
    pub fn builtin() -> Self {
        let scenes = presets::builtin_scenes()
            .into_iter()
            .map(|scene| (scene.name.clone(), scene))
            .collect();
        Self { scenes }
    }

    /// Built-ins plus every scene in `files`. A file may hold one scene or a
    /// list; later definitions replace earlier ones with the same name.
    pub fn with_files<P: AsRef<Path>>(files: &[P]) -> Result<Self> {
        let mut library = Self::builtin();
        for path in files {
            library.load_file(path.as_ref())?;
        }
        Ok(library)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            PulseError::config(format!("cannot read scene file {}: {err}", path.display()))
        })?;
        let parsed: SceneFile = serde_json::from_str(&text)
            .map_err(|err| PulseError::config(format!("{}: {err}", path.display())))?;
        let scenes = match parsed {
            SceneFile::One(scene) => vec![scene],
            SceneFile::Many(scenes) => scenes,
        };
        let count = scenes.len();
        for scene in scenes {
            tracing::debug!(scene = %scene.name, path = %path.display(), "loaded scene");
            self.insert(scene);
        }
        Ok(count)
    }

    pub fn insert(&mut self, scene: SceneDescriptor) {
        self.scenes.insert(scene.name.clone(), scene);
    }

    pub fn get(&self, name: &str) -> Option<&SceneDescriptor> {
        self.scenes.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&SceneDescriptor> {
        self.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.names().collect();
            PulseError::config(format!(
                "unknown scene `{name}` (known: {})",
                known.join(", ")
            ))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.scenes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneDescriptor> + '_ {
        self.scenes.values()
    }

    /// Resolves every scene so configuration mistakes surface at startup.
    pub fn validate_all(
        &self,
        registry: &EffectRegistry,
        overrides: &BTreeMap<String, f32>,
    ) -> Result<()> {
        for scene in self.scenes.values() {
            scene.resolve(registry, overrides)?;
        }
        Ok(())
    }

    /// The scene after `current` in `cycle`, or in name order when `cycle`
    /// is empty. Wraps around.
    pub fn next_after(&self, current: &str, cycle: &[String]) -> Option<String> {
        let order: Vec<&str> = if cycle.is_empty() {
            self.names().collect()
        } else {
            cycle.iter().map(String::as_str).collect()
        };
        if order.is_empty() {
            return None;
        }
        let next = match order.iter().position(|&name| name == current) {
            Some(i) => order[(i + 1) % order.len()],
            None => order[0],
        };
        Some(next.to_string())
    }
}

impl Default for SceneLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn registry() -> EffectRegistry {
        EffectRegistry::builtin()
    }

    #[test]
    fn every_builtin_scene_resolves() {
        let library = SceneLibrary::builtin();
        for name in ["mood", "punchy", "spectrum", "warmcool", "focus", "danger", "drift"] {
            let scene = library.require(name).unwrap();
            scene.resolve(&registry(), &BTreeMap::new()).unwrap();
        }
        assert!(library.require("disco").is_err());
    }

    #[test]
    fn overrides_apply_to_matching_layers() {
        let mut overrides = BTreeMap::new();
        overrides.insert("bass_pulse.swing".to_string(), 0.12);
        let scene = SceneLibrary::builtin()
            .require("mood")
            .unwrap()
            .resolve(&registry(), &overrides)
            .unwrap();
        let layer = scene.layers_for(Channel::Background).next().unwrap();
        assert_eq!(layer.effect.name, "bass_pulse");
        assert_eq!(layer.knobs.get("swing"), 0.12);
    }

    #[test]
    fn configuration_errors_are_rejected() {
        let base = SceneDescriptor {
            name: "custom".into(),
            description: String::new(),
            layers: vec![LayerDescriptor::new(LayerTarget::Background, "bass_pulse")],
            constraints: ConstraintSettings::default(),
        };
        let registry = registry();

        let mut overrides = BTreeMap::new();
        overrides.insert("bass_pulse.swing".to_string(), 3.0);
        assert!(base.resolve(&registry, &overrides).is_err());

        let mut overrides = BTreeMap::new();
        overrides.insert("nope.swing".to_string(), 0.1);
        assert!(base.resolve(&registry, &overrides).is_err());

        let mut bad = base.clone();
        bad.layers[0].effect = "strobe".into();
        assert!(matches!(bad.resolve(&registry, &BTreeMap::new()), Err(PulseError::Config(_))));

        let mut bad = base.clone();
        bad.layers[0] = LayerDescriptor::new(LayerTarget::Indices(vec![1, 16]), "bass_pulse");
        assert!(bad.resolve(&registry, &BTreeMap::new()).is_err());

        let mut bad = base.clone();
        bad.layers[0] = LayerDescriptor::new(LayerTarget::Background, "spectrum_map");
        assert!(bad.resolve(&registry, &BTreeMap::new()).is_err());

        let mut bad = base;
        bad.layers[0] = bad.layers[0].clone().knob("swing", -1.0);
        assert!(bad.resolve(&registry, &BTreeMap::new()).is_err());
    }

    #[test]
    fn loads_scene_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{
                "name": "alarm",
                "layers": [
                    {{ "target": {{ "indices": [1, 9] }}, "effect": "bass_pulse", "knobs": {{ "swing": 0.2 }} }},
                    {{ "target": "foreground", "effect": "treble_swing" }}
                ],
                "constraints": {{ "min_contrast": 0.3, "protection": {{ "mode": "none" }} }}
            }}]"#
        )
        .unwrap();

        let library = SceneLibrary::with_files(&[file.path()]).unwrap();
        let scene = library.require("alarm").unwrap().resolve(&registry(), &BTreeMap::new()).unwrap();
        assert!(scene.touches(Channel::Palette(9)));
        assert!(!scene.touches(Channel::Palette(2)));
        assert_eq!(scene.constraints.min_contrast, 0.3);
        assert!(library.get("mood").is_some());
    }

    #[test]
    fn cycles_through_scenes() {
        let library = SceneLibrary::builtin();
        let cycle = vec!["mood".to_string(), "focus".to_string()];
        assert_eq!(library.next_after("mood", &cycle).unwrap(), "focus");
        assert_eq!(library.next_after("focus", &cycle).unwrap(), "mood");
        assert_eq!(library.next_after("danger", &[]).unwrap(), "drift");
    }

    #[test]
    fn switch_mode_uses_lowercase_names() {
        let mode: SwitchMode = serde_json::from_str("\"jump\"").unwrap();
        assert_eq!(mode, SwitchMode::Jump);
        assert_eq!(serde_json::to_string(&SwitchMode::Reseed).unwrap(), "\"reseed\"");
    }
}
