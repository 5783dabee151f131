//! The per-frame pipeline, free of I/O: spectrum in, colors out.

use crate::analysis::{
    ActivitySignal, ActivityTracker, BandExtractor, BandLayout, EnergyState, SmootherBank,
};
use crate::audio::SpectrumFrame;
use crate::color::ColorFrame;
use crate::config::AppConfig;
use crate::constraints::ConstraintPipeline;
use crate::scene::{Scene, SceneComposer, SwitchMode};
use crate::timeline::PlaybackClock;

/// Everything needed to turn spectrum frames into constrained colors.
#[derive(Debug, Clone)]
pub struct Engine {
    extractor: BandExtractor,
    smoother: SmootherBank,
    activity: ActivityTracker,
    energy: EnergyState,
    composer: SceneComposer,
    constraints: ConstraintPipeline,
    clock: PlaybackClock,
    baseline: ColorFrame,
    switch_mode: SwitchMode,
}

impl Engine {
    pub fn new(config: &AppConfig, scene: Scene, baseline: ColorFrame) -> Self {
        let layout = BandLayout::new(config.source.bars, &config.bands);
        let constraints =
            ConstraintPipeline::new(scene.constraints.clone(), config.idle.clone(), baseline);
        Self {
            extractor: BandExtractor::new(layout),
            smoother: SmootherBank::new(&config.smoothing),
            activity: ActivityTracker::new(config.smoothing.activity, &config.idle),
            energy: EnergyState::silent(),
            composer: SceneComposer::new(scene),
            constraints,
            clock: PlaybackClock::default(),
            baseline,
            switch_mode: config.scene.switch_mode,
        }
    }

    pub fn scene_name(&self) -> &str {
        &self.composer.scene().name
    }

    pub fn energy(&self) -> &EnergyState {
        &self.energy
    }

    pub fn activity(&self) -> ActivitySignal {
        self.activity.signal()
    }

    pub fn elapsed(&self) -> f32 {
        self.clock.time_seconds
    }

    pub fn baseline(&self) -> &ColorFrame {
        &self.baseline
    }

    /// Runs one frame `dt` seconds after the previous one.
    ///
    /// `spectrum` is `None` when no new frame arrived since the last tick;
    /// the previous energies are then reused as they are. The clock and the
    /// idle timer advance either way.
    pub fn tick(&mut self, spectrum: Option<&SpectrumFrame>, dt: f32) -> ColorFrame {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.clock.advance(dt);

        if let Some(frame) = spectrum {
            let raw = self.extractor.extract(frame);
            self.energy = self.smoother.update(&raw, dt);
        }
        let activity = self.activity.update(self.energy.global, dt);

        let proposed = self
            .composer
            .compose(&self.baseline, &self.energy, self.clock.time_seconds);
        self.constraints.apply(proposed, activity)
    }

    /// Makes `scene` active. The scene clock restarts; whether the colors
    /// glide or jump depends on the configured switch mode.
    pub fn switch_scene(&mut self, scene: Scene) {
        let keep_memory = self.switch_mode == SwitchMode::Reseed;
        tracing::info!(
            from = %self.composer.scene().name,
            to = %scene.name,
            mode = ?self.switch_mode,
            "switching scene"
        );
        self.constraints.switch(scene.constraints.clone(), keep_memory);
        self.composer.set_scene(scene);
        self.clock.reset();
    }

    pub fn set_switch_mode(&mut self, mode: SwitchMode) {
        self.switch_mode = mode;
    }

    /// External activity (for example a keypress) restarts the idle timer.
    pub fn note_activity(&mut self) {
        self.activity.note_activity();
    }
}
