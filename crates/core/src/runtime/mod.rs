//! Process-level orchestration: the spectrum reader thread, the frame tick
//! loop, scene switching and the shutdown path that puts the terminal back.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{select, Receiver};

use crate::audio::{FifoReader, FrameSlot};
use crate::baseline::{BaselineManager, RestoreOutcome, TerminalIo, TtyQuery};
use crate::config::AppConfig;
use crate::effects::EffectRegistry;
use crate::engine::Engine;
use crate::render::{reset_sequence, ChannelMask, FrameWriter, Terminator, TerminatorMode};
use crate::scene::{Scene, SceneLibrary};
use crate::timeline::FramePacer;
use crate::{PulseError, Result};

/// Requests delivered to a running engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    /// Advance to the next scene of the configured cycle.
    NextScene,
    SwitchScene(String),
    /// Restart the idle timer.
    NoteActivity,
    Shutdown,
}

/// Why the tick loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    /// Every control sender went away.
    ControlsClosed,
    WriteFailed,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub scene: String,
    pub ticks: u64,
    /// Frames that produced at least one byte of output.
    pub frames_written: u64,
    pub skipped: u64,
    pub stop: StopReason,
    pub restore: RestoreOutcome,
}

impl RunReport {
    /// A run is clean when it was asked to stop and left the terminal as it
    /// found it.
    pub fn is_clean(&self) -> bool {
        self.stop != StopReason::WriteFailed && self.restore.is_success()
    }
}

/// A validated configuration together with the scenes and effects it refers
/// to. Building one performs every startup check, so a `Runtime` that
/// exists can run without configuration errors.
#[derive(Debug)]
pub struct Runtime {
    config: AppConfig,
    library: SceneLibrary,
    registry: EffectRegistry,
}

impl Runtime {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let library = SceneLibrary::with_files(&config.scene.files)?;
        let registry = EffectRegistry::builtin();
        library.validate_all(&registry, &config.scene.knobs)?;
        library.require(&config.scene.name)?;
        for name in &config.scene.cycle {
            library.require(name)?;
        }
        Ok(Self {
            config,
            library,
            registry,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn library(&self) -> &SceneLibrary {
        &self.library
    }

    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    pub fn resolve(&self, name: &str) -> Result<Scene> {
        self.library
            .require(name)?
            .resolve(&self.registry, &self.config.scene.knobs)
    }

    /// Runs against the configured output device until a [`Control::Shutdown`]
    /// arrives or output fails. The only error returned is the device itself
    /// being unavailable; everything after that is reported in the
    /// [`RunReport`].
    pub fn run(&self, controls: &Receiver<Control>) -> Result<RunReport> {
        let device = open_output(&self.config.output.device)?;
        let manager = {
            let mut tty = if self.config.baseline.query {
                match TtyQuery::open(&self.config.output.device) {
                    Ok(tty) => Some(tty),
                    Err(err) => {
                        tracing::warn!(%err, "terminal cannot be queried, using configured colors");
                        None
                    }
                }
            } else {
                None
            };
            self.capture(tty.as_mut().map(|tty| tty as &mut dyn TerminalIo))
        };
        Ok(self.run_with(device, manager, controls))
    }

    /// Captures the baseline, querying through `io` when given.
    pub fn capture(&self, io: Option<&mut dyn TerminalIo>) -> BaselineManager {
        let mut manager = BaselineManager::new();
        let captured = manager.capture(io, &self.config.baseline, self.config.output.terminator);
        let fallback = captured.fallback_channels();
        if !fallback.is_empty() {
            tracing::info!(channels = fallback.len(), "some channels use configured baseline colors");
        }
        manager
    }

    /// Runs the engine writing to `out`. The baseline in `manager` is
    /// restored through the same writer before returning, whatever ended
    /// the run.
    pub fn run_with<W: Write>(
        &self,
        out: W,
        mut manager: BaselineManager,
        controls: &Receiver<Control>,
    ) -> RunReport {
        // Returns the earlier capture when there is one.
        let captured = manager.capture(None, &self.config.baseline, self.config.output.terminator);
        let (terminator, on_screen, baseline) =
            (captured.terminator(), *captured.rgb(), captured.colors());

        let mut writer = FrameWriter::new(
            out,
            terminator,
            ChannelMask::from_config(&self.config.output),
            self.config.output.min_rgb_delta,
            on_screen,
        );

        let scene = match self.resolve(&self.config.scene.name) {
            Ok(scene) => scene,
            Err(err) => {
                // Validated in `new`; only reachable if the library changed.
                tracing::error!(%err, "active scene failed to resolve");
                let restore = manager.restore(writer.get_mut());
                return RunReport {
                    scene: self.config.scene.name.clone(),
                    ticks: 0,
                    frames_written: 0,
                    skipped: 0,
                    stop: StopReason::Shutdown,
                    restore,
                };
            }
        };
        let mut engine = Engine::new(&self.config, scene, baseline);
        tracing::info!(
            scene = %engine.scene_name(),
            terminator = %terminator,
            fps = self.config.output.fps_cap,
            "engine started"
        );

        let reader = FifoReader::new(&self.config.source);
        let slot = FrameSlot::new();
        let stop = AtomicBool::new(false);

        let (stop_reason, stats) = thread::scope(|scope| {
            scope.spawn(|| reader.run(&slot, &stop));
            let outcome = self.tick_loop(&mut engine, &mut writer, &slot, controls);
            stop.store(true, Ordering::Relaxed);
            outcome
        });

        let restore = manager.restore(writer.get_mut());
        tracing::info!(
            ticks = stats.ticks,
            frames = writer.frames_written(),
            skipped = stats.skipped,
            reason = ?stop_reason,
            restore = ?restore,
            "engine stopped"
        );
        RunReport {
            scene: engine.scene_name().to_string(),
            ticks: stats.ticks,
            frames_written: writer.frames_written(),
            skipped: stats.skipped,
            stop: stop_reason,
            restore,
        }
    }

    fn tick_loop<W: Write>(
        &self,
        engine: &mut Engine,
        writer: &mut FrameWriter<W>,
        slot: &FrameSlot,
        controls: &Receiver<Control>,
    ) -> (StopReason, LoopStats) {
        let mut pacer = FramePacer::new(self.config.output.frame_interval(), Instant::now());
        let mut stats = LoopStats::default();
        let mut last_tick: Option<Instant> = None;
        let mut seen = 0u64;

        loop {
            let wait = pacer.time_until_next(Instant::now());
            select! {
                recv(controls) -> message => match message {
                    Ok(Control::Shutdown) => return (StopReason::Shutdown, stats.finish(&pacer)),
                    Ok(control) => self.handle(engine, control),
                    Err(_) => return (StopReason::ControlsClosed, stats.finish(&pacer)),
                },
                default(wait) => {}
            }

            let now = Instant::now();
            if !pacer.is_due(now) {
                continue;
            }
            let dt = last_tick
                .map(|last| now.duration_since(last).as_secs_f32())
                .unwrap_or(0.0);
            last_tick = Some(now);

            let spectrum = match slot.latest_after(seen) {
                Ok(Some((sequence, frame))) => {
                    seen = sequence;
                    Some(frame)
                }
                Ok(None) => None,
                Err(err) => {
                    tracing::warn!(%err, "spectrum slot unreadable, reusing last energies");
                    None
                }
            };

            let colors = engine.tick(spectrum.as_ref(), dt);
            stats.ticks += 1;
            match writer.write_frame(&colors) {
                Ok(bytes) => tracing::trace!(bytes, "frame written"),
                Err(err) => {
                    tracing::error!(%err, "output failed, shutting down");
                    return (StopReason::WriteFailed, stats.finish(&pacer));
                }
            }

            let skipped = pacer.complete(Instant::now());
            if skipped > 0 {
                tracing::debug!(skipped, "frame overran its interval");
            }
        }
    }

    fn handle(&self, engine: &mut Engine, control: Control) {
        match control {
            Control::NextScene => {
                let next = self
                    .library
                    .next_after(engine.scene_name(), &self.config.scene.cycle);
                if let Some(name) = next {
                    self.switch(engine, &name);
                }
            }
            Control::SwitchScene(name) => self.switch(engine, &name),
            Control::NoteActivity => engine.note_activity(),
            Control::Shutdown => {}
        }
    }

    fn switch(&self, engine: &mut Engine, name: &str) {
        match self.resolve(name) {
            Ok(scene) => engine.switch_scene(scene),
            Err(err) => tracing::warn!(%err, scene = name, "scene switch ignored"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct LoopStats {
    ticks: u64,
    skipped: u64,
}

impl LoopStats {
    fn finish(mut self, pacer: &FramePacer) -> Self {
        self.skipped = pacer.skipped();
        self
    }
}

/// Opens the output device for writing without making it the controlling
/// terminal. Failure here is the one fatal runtime error.
pub fn open_output(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
        .map_err(|source| PulseError::DeviceUnavailable {
            path: path.display().to_string(),
            source,
        })
}

/// Asks the terminal to reset every color this program touches to its own
/// defaults. Used when no captured baseline is at hand.
pub fn reset_terminal(path: &Path, mode: TerminatorMode) -> Result<()> {
    let mut device = open_output(path)?;
    let terminator = mode.fixed().unwrap_or(Terminator::Bel);
    device
        .write_all(&reset_sequence(terminator))
        .and_then(|_| device.flush())
        .map_err(PulseError::EncodingWrite)?;
    tracing::info!(device = %path.display(), %terminator, "terminal colors reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use crossbeam_channel::unbounded;

    use super::*;
    use crate::baseline::fake::ScriptedTerminal;

    fn config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.source.fifo = dir.join("absent.fifo");
        config.source.poll_interval_ms = 5;
        config.output.fps_cap = 100.0;
        config.baseline.query = false;
        config
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unknown_scene_fails_before_any_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.scene.name = "nope".to_string();
        let err = Runtime::new(config).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn unknown_cycle_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.scene.cycle = vec!["mood".into(), "missing".into()];
        assert!(Runtime::new(config).is_err());
    }

    #[test]
    fn bad_knob_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.scene.knobs.insert("bass_pulse.swing".into(), 50.0);
        assert!(Runtime::new(config).unwrap_err().is_fatal());
    }

    #[test]
    fn shutdown_restores_the_baseline_last() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(config(dir.path())).unwrap();
        let manager = runtime.capture(None);
        let expected = manager.captured().unwrap().restore_sequence();

        let (tx, rx) = unbounded();
        let mut out: Vec<u8> = Vec::new();
        let report = thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(150));
                tx.send(Control::Shutdown).unwrap();
            });
            runtime.run_with(&mut out, manager, &rx)
        });

        assert_eq!(report.stop, StopReason::Shutdown);
        assert_eq!(report.restore, RestoreOutcome::Restored);
        assert!(report.ticks > 0);
        assert!(report.is_clean());
        assert!(out.ends_with(&expected));
    }

    #[test]
    fn dropped_controls_end_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(config(dir.path())).unwrap();
        let (tx, rx) = unbounded::<Control>();
        drop(tx);
        let report = runtime.run_with(Vec::<u8>::new(), runtime.capture(None), &rx);
        assert_eq!(report.stop, StopReason::ControlsClosed);
        assert_eq!(report.restore, RestoreOutcome::Restored);
    }

    #[test]
    fn scene_controls_switch_and_unknown_names_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.scene.cycle = vec!["mood".into(), "punchy".into()];
        let runtime = Runtime::new(config).unwrap();

        let (tx, rx) = unbounded();
        tx.send(Control::NextScene).unwrap();
        tx.send(Control::SwitchScene("nope".into())).unwrap();
        tx.send(Control::NoteActivity).unwrap();
        tx.send(Control::Shutdown).unwrap();
        let report = runtime.run_with(Vec::<u8>::new(), runtime.capture(None), &rx);

        assert_eq!(report.scene, "punchy");
        assert_eq!(report.stop, StopReason::Shutdown);
    }

    #[test]
    fn write_failure_stops_and_still_attempts_restore() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.output.min_rgb_delta = 0;
        let runtime = Runtime::new(config).unwrap();
        let (_tx, rx) = unbounded::<Control>();
        let report = runtime.run_with(Broken, runtime.capture(None), &rx);

        assert_eq!(report.stop, StopReason::WriteFailed);
        assert_eq!(report.restore, RestoreOutcome::Failed);
        assert!(!report.is_clean());
    }

    #[test]
    fn queried_baseline_is_replayed_on_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.baseline.query = true;
        config.output.terminator = TerminatorMode::Bel;
        let runtime = Runtime::new(config).unwrap();

        let mut terminal = ScriptedTerminal::default()
            .answer(b"\x1b]11;?\x07", b"\x1b]11;rgb:1c1c/1c1c/1c1c\x07");
        let manager = runtime.capture(Some(&mut terminal));

        let (tx, rx) = unbounded();
        tx.send(Control::Shutdown).unwrap();
        let mut out: Vec<u8> = Vec::new();
        let report = runtime.run_with(&mut out, manager, &rx);

        assert_eq!(report.restore, RestoreOutcome::Restored);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("\x1b]11;rgb:1c1c/1c1c/1c1c\x07"));
    }

    #[test]
    fn missing_device_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_output(&dir.path().join("no-such-dir").join("tty")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn reset_writes_all_four_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device");
        File::create(&path).unwrap();
        reset_terminal(&path, TerminatorMode::St).unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, reset_sequence(Terminator::St));
    }
}
