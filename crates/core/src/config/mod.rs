use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::SampleWidth;
use crate::color::{Rgb8, PALETTE_SIZE};
use crate::constraints::IdleMode;
use crate::render::TerminatorMode;
use crate::scene::SwitchMode;
use crate::{PulseError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub bands: BandsConfig,
    pub smoothing: SmoothingConfig,
    pub output: OutputConfig,
    pub baseline: BaselineConfig,
    pub scene: SceneConfig,
    pub idle: IdleConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections and fields take
    /// their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            PulseError::config(format!("cannot read {}: {err}", path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|err| PulseError::config(format!("{}: {err}", path.display())))
    }

    /// Checks every field that can be checked without the scene library.
    /// Runs before the terminal is touched.
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        self.bands.validate()?;
        self.smoothing.validate()?;
        self.output.validate()?;
        self.baseline.validate()?;
        self.scene.validate()?;
        self.idle.validate()
    }
}

/// Where spectrum frames come from and how they are laid out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub fifo: PathBuf,
    pub bars: usize,
    pub sample_width: SampleWidth,
    pub poll_interval_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            fifo: PathBuf::from("/tmp/cava.fifo"),
            bars: 64,
            sample_width: SampleWidth::U8,
            poll_interval_ms: 50,
        }
    }
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        if self.bars == 0 || self.bars > 4096 {
            return Err(PulseError::config(format!(
                "bar count must be in 1..=4096, got {}",
                self.bars
            )));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 500 {
            return Err(PulseError::config(
                "source poll interval must be in 1..=500 ms",
            ));
        }
        Ok(())
    }
}

/// Fractional slice `[start, end)` of the bar sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRange {
    pub start: f32,
    pub end: f32,
}

impl BandRange {
    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Parses `lo:hi`, e.g. `0.00:0.18`.
    pub fn parse(value: &str) -> Result<Self> {
        let (lo, hi) = value
            .split_once(':')
            .ok_or_else(|| PulseError::config(format!("expected lo:hi, got `{value}`")))?;
        let parse = |s: &str| {
            s.trim()
                .parse::<f32>()
                .map_err(|err| PulseError::config(format!("bad band bound `{s}`: {err}")))
        };
        Ok(Self::new(parse(lo)?, parse(hi)?))
    }

    fn validate(&self, name: &str) -> Result<()> {
        let in_unit = |x: f32| (0.0..=1.0).contains(&x);
        if !in_unit(self.start) || !in_unit(self.end) || self.start >= self.end {
            return Err(PulseError::config(format!(
                "{name} band must satisfy 0 <= start < end <= 1, got {}:{}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandsConfig {
    pub bass: BandRange,
    pub mid: BandRange,
    pub treble: BandRange,
}

impl Default for BandsConfig {
    fn default() -> Self {
        Self {
            bass: BandRange::new(0.0, 0.18),
            mid: BandRange::new(0.18, 0.55),
            treble: BandRange::new(0.55, 1.0),
        }
    }
}

impl BandsConfig {
    fn validate(&self) -> Result<()> {
        self.bass.validate("bass")?;
        self.mid.validate("mid")?;
        self.treble.validate("treble")
    }
}

/// Smoothing time constants, in seconds. Zero disables smoothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub global: f32,
    pub bands: f32,
    pub impact_attack: f32,
    pub impact_release: f32,
    pub activity: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            bass: 0.07,
            mid: 0.10,
            treble: 0.08,
            global: 0.12,
            bands: 0.08,
            impact_attack: 0.08,
            impact_release: 0.30,
            activity: 0.25,
        }
    }
}

impl SmoothingConfig {
    fn validate(&self) -> Result<()> {
        let fields = [
            ("bass", self.bass),
            ("mid", self.mid),
            ("treble", self.treble),
            ("global", self.global),
            ("bands", self.bands),
            ("impact_attack", self.impact_attack),
            ("impact_release", self.impact_release),
            ("activity", self.activity),
        ];
        for (name, value) in fields {
            if !value.is_finite() || !(0.0..=10.0).contains(&value) {
                return Err(PulseError::config(format!(
                    "smoothing.{name} must be within 0..=10 seconds, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Output device and emission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub device: PathBuf,
    pub fps_cap: f32,
    pub terminator: TerminatorMode,
    /// Minimum change on any RGB component before a channel is re-sent.
    pub min_rgb_delta: u8,
    pub foreground: bool,
    pub background: bool,
    pub palette: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/tty"),
            fps_cap: 20.0,
            terminator: TerminatorMode::Auto,
            min_rgb_delta: 2,
            foreground: true,
            background: true,
            palette: true,
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        if !self.fps_cap.is_finite() || self.fps_cap <= 0.0 || self.fps_cap > 240.0 {
            return Err(PulseError::config(format!(
                "fps cap must be in (0, 240], got {}",
                self.fps_cap
            )));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f32(1.0 / self.fps_cap)
    }
}

/// Baseline capture settings and the colors used when a query fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub query: bool,
    pub timeout_ms: u64,
    pub fallback_foreground: Rgb8,
    pub fallback_background: Rgb8,
    pub fallback_palette: Vec<Rgb8>,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            query: true,
            timeout_ms: 120,
            fallback_foreground: Rgb8::new(0xd0, 0xd0, 0xd0),
            fallback_background: Rgb8::new(0x12, 0x12, 0x12),
            fallback_palette: XTERM_PALETTE.to_vec(),
        }
    }
}

impl BaselineConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 || self.timeout_ms > 5_000 {
            return Err(PulseError::config(
                "baseline query timeout must be in 1..=5000 ms",
            ));
        }
        if self.fallback_palette.len() != PALETTE_SIZE {
            return Err(PulseError::config(format!(
                "fallback palette needs {PALETTE_SIZE} entries, got {}",
                self.fallback_palette.len()
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

/// The stock xterm 16-color palette.
pub const XTERM_PALETTE: [Rgb8; PALETTE_SIZE] = [
    Rgb8::new(0x00, 0x00, 0x00),
    Rgb8::new(0xcd, 0x00, 0x00),
    Rgb8::new(0x00, 0xcd, 0x00),
    Rgb8::new(0xcd, 0xcd, 0x00),
    Rgb8::new(0x00, 0x00, 0xee),
    Rgb8::new(0xcd, 0x00, 0xcd),
    Rgb8::new(0x00, 0xcd, 0xcd),
    Rgb8::new(0xe5, 0xe5, 0xe5),
    Rgb8::new(0x7f, 0x7f, 0x7f),
    Rgb8::new(0xff, 0x00, 0x00),
    Rgb8::new(0x00, 0xff, 0x00),
    Rgb8::new(0xff, 0xff, 0x00),
    Rgb8::new(0x5c, 0x5c, 0xff),
    Rgb8::new(0xff, 0x00, 0xff),
    Rgb8::new(0x00, 0xff, 0xff),
    Rgb8::new(0xff, 0xff, 0xff),
];

/// Scene selection and per-effect knob overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub name: String,
    pub switch_mode: SwitchMode,
    /// Overrides keyed by `effect.knob`, e.g. `bass_pulse.swing`.
    pub knobs: BTreeMap<String, f32>,
    /// Extra scene definitions (JSON) to load alongside the built-ins.
    pub files: Vec<PathBuf>,
    /// Scenes visited, in order, when a scene switch is requested. Empty
    /// means every known scene in name order.
    pub cycle: Vec<String>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            name: "mood".to_string(),
            switch_mode: SwitchMode::Reseed,
            knobs: BTreeMap::new(),
            files: Vec::new(),
            cycle: Vec::new(),
        }
    }
}

impl SceneConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PulseError::config("scene name must not be empty"));
        }
        for (key, value) in &self.knobs {
            if key.split_once('.').is_none() {
                return Err(PulseError::config(format!(
                    "knob override `{key}` must be written as effect.knob"
                )));
            }
            if !value.is_finite() {
                return Err(PulseError::config(format!(
                    "knob override `{key}` is not a finite number"
                )));
            }
        }
        Ok(())
    }
}

/// When sustained silence returns the terminal to its baseline colors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Activity level below which the input counts as silent.
    pub threshold: f32,
    /// How long silence must last before idle handling starts.
    pub silence_seconds: f32,
    /// How long the fade back to baseline takes.
    pub blend_seconds: f32,
    pub mode: IdleMode,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            threshold: 0.04,
            silence_seconds: 0.6,
            blend_seconds: 1.5,
            mode: IdleMode::Fade,
        }
    }
}

impl IdleConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(PulseError::config("idle threshold must be within 0..=1"));
        }
        if !self.silence_seconds.is_finite() || self.silence_seconds < 0.0 {
            return Err(PulseError::config("idle silence duration must be >= 0"));
        }
        if !self.blend_seconds.is_finite() || self.blend_seconds < 0.0 {
            return Err(PulseError::config("idle blend duration must be >= 0"));
        }
        Ok(())
    }
}
