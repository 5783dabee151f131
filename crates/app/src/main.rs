use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Args, Parser, Subcommand, ValueEnum};
use palette_pulse_core::config::BandRange;
use palette_pulse_core::{
    AppConfig, IdleMode, PulseError, Runtime, SampleWidth, SceneLibrary, SwitchMode,
    TerminatorMode,
};
use tracing_subscriber::EnvFilter;

mod signals;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("palette-pulse: cannot open log file: {err}");
        return ExitCode::from(2);
    }

    let result = match &cli.command {
        Commands::Run(args) => run(cli.config.as_deref(), args),
        Commands::Scenes { scene_files } => list_scenes(cli.config.as_deref(), scene_files),
        Commands::Effects => list_effects(),
        Commands::Reset { device, terminator } => reset(cli.config.as_deref(), device, *terminator),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(%err, "palette-pulse failed");
            eprintln!("palette-pulse: {err}");
            if matches!(err, PulseError::Config(_)) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(config_path: Option<&Path>, args: &RunArgs) -> palette_pulse_core::Result<ExitCode> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config)?;
    let runtime = Runtime::new(config)?;

    let (tx, rx) = crossbeam_channel::unbounded();
    signals::forward_to(tx)?;

    tracing::info!(
        scene = %runtime.config().scene.name,
        device = %runtime.config().output.device.display(),
        "starting"
    );
    let report = runtime.run(&rx)?;
    tracing::info!(
        scene = %report.scene,
        frames = report.frames_written,
        restore = ?report.restore,
        "finished"
    );
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list_scenes(
    config_path: Option<&Path>,
    extra: &[PathBuf],
) -> palette_pulse_core::Result<ExitCode> {
    let config = load_config(config_path)?;
    let mut files = config.scene.files.clone();
    files.extend_from_slice(extra);
    let library = SceneLibrary::with_files(&files)?;
    for scene in library.iter() {
        println!("{:<10} {}", scene.name, scene.description);
        for layer in &scene.layers {
            println!("{:<10}   {} <- {}", "", layer.target, layer.effect);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn list_effects() -> palette_pulse_core::Result<ExitCode> {
    let registry = palette_pulse_core::EffectRegistry::builtin();
    for effect in registry.iter() {
        let targets: Vec<String> = effect
            .targets
            .iter()
            .map(|kind| format!("{kind:?}").to_lowercase())
            .collect();
        println!(
            "{} ({}; {})\n    {}",
            effect.name,
            effect.category,
            targets.join(", "),
            effect.summary
        );
        for knob in effect.knobs {
            println!(
                "    {:<14} default {:<6} range {}..={}  {}",
                knob.name, knob.default, knob.min, knob.max, knob.summary
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn reset(
    config_path: Option<&Path>,
    device: &Option<PathBuf>,
    terminator: Option<TerminatorArg>,
) -> palette_pulse_core::Result<ExitCode> {
    let config = load_config(config_path)?;
    let device = device.clone().unwrap_or(config.output.device);
    let mode = terminator.map(Into::into).unwrap_or(config.output.terminator);
    palette_pulse_core::runtime::reset_terminal(&device, mode)?;
    Ok(ExitCode::SUCCESS)
}

fn load_config(path: Option<&Path>) -> palette_pulse_core::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

/// Logs go to stderr or a file; stdout belongs to the terminal being colored.
fn init_tracing(log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Drives terminal colors from a live audio spectrum", long_about = None)]
struct Cli {
    /// JSON configuration file. Flags override its values.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the color engine until interrupted.
    Run(RunArgs),
    /// List the known scenes and their layers.
    Scenes {
        /// Extra scene files to load.
        #[arg(long = "scene-file")]
        scene_files: Vec<PathBuf>,
    },
    /// List the built-in effects and their knobs.
    Effects,
    /// Reset foreground, background and palette to the terminal's defaults.
    Reset {
        #[arg(long)]
        device: Option<PathBuf>,
        #[arg(long, value_enum)]
        terminator: Option<TerminatorArg>,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Scene to start with.
    #[arg(short, long)]
    scene: Option<String>,
    /// Spectrum FIFO path.
    #[arg(long)]
    fifo: Option<PathBuf>,
    /// Number of bars per spectrum frame.
    #[arg(long)]
    bars: Option<usize>,
    #[arg(long, value_enum)]
    sample_width: Option<SampleWidthArg>,
    /// Terminal device that receives the escape sequences.
    #[arg(long)]
    device: Option<PathBuf>,
    /// Frame-rate cap.
    #[arg(long)]
    fps: Option<f32>,
    #[arg(long, value_enum)]
    terminator: Option<TerminatorArg>,
    /// Minimum RGB component change before a channel is re-sent.
    #[arg(long)]
    min_delta: Option<u8>,
    /// Skip querying the terminal and use the configured baseline colors.
    #[arg(long)]
    no_query: bool,
    #[arg(long, value_enum)]
    switch_mode: Option<SwitchModeArg>,
    #[arg(long, value_enum)]
    idle_mode: Option<IdleModeArg>,
    /// Knob override, `effect.knob=value`. Repeatable.
    #[arg(long = "knob", value_name = "EFFECT.KNOB=VALUE")]
    knobs: Vec<String>,
    /// Extra scene file. Repeatable.
    #[arg(long = "scene-file")]
    scene_files: Vec<PathBuf>,
    /// Scenes visited by SIGUSR1, in order. Repeatable.
    #[arg(long = "cycle")]
    cycle: Vec<String>,
    /// Bass band as `lo:hi` fractions of the bar range.
    #[arg(long)]
    bass: Option<String>,
    #[arg(long)]
    mid: Option<String>,
    #[arg(long)]
    treble: Option<String>,
    /// Keep foreground and background untouched.
    #[arg(long)]
    palette_only: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) -> palette_pulse_core::Result<()> {
        if let Some(scene) = &self.scene {
            config.scene.name = scene.clone();
        }
        if let Some(fifo) = &self.fifo {
            config.source.fifo = fifo.clone();
        }
        if let Some(bars) = self.bars {
            config.source.bars = bars;
        }
        if let Some(width) = self.sample_width {
            config.source.sample_width = width.into();
        }
        if let Some(device) = &self.device {
            config.output.device = device.clone();
        }
        if let Some(fps) = self.fps {
            config.output.fps_cap = fps;
        }
        if let Some(terminator) = self.terminator {
            config.output.terminator = terminator.into();
        }
        if let Some(delta) = self.min_delta {
            config.output.min_rgb_delta = delta;
        }
        if self.no_query {
            config.baseline.query = false;
        }
        if let Some(mode) = self.switch_mode {
            config.scene.switch_mode = mode.into();
        }
        if let Some(mode) = self.idle_mode {
            config.idle.mode = mode.into();
        }
        for knob in &self.knobs {
            let (key, value) = parse_knob(knob)?;
            config.scene.knobs.insert(key, value);
        }
        config.scene.files.extend(self.scene_files.iter().cloned());
        if !self.cycle.is_empty() {
            config.scene.cycle = self.cycle.clone();
        }
        if let Some(range) = &self.bass {
            config.bands.bass = BandRange::parse(range)?;
        }
        if let Some(range) = &self.mid {
            config.bands.mid = BandRange::parse(range)?;
        }
        if let Some(range) = &self.treble {
            config.bands.treble = BandRange::parse(range)?;
        }
        if self.palette_only {
            config.output.foreground = false;
            config.output.background = false;
        }
        Ok(())
    }
}

fn parse_knob(value: &str) -> palette_pulse_core::Result<(String, f32)> {
    let (key, number) = value.split_once('=').ok_or_else(|| {
        PulseError::config(format!("knob override `{value}` must look like effect.knob=value"))
    })?;
    let number = number
        .trim()
        .parse::<f32>()
        .map_err(|err| PulseError::config(format!("knob override `{value}`: {err}")))?;
    Ok((key.trim().to_string(), number))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TerminatorArg {
    Auto,
    Bel,
    St,
}

impl From<TerminatorArg> for TerminatorMode {
    fn from(value: TerminatorArg) -> Self {
        match value {
            TerminatorArg::Auto => TerminatorMode::Auto,
            TerminatorArg::Bel => TerminatorMode::Bel,
            TerminatorArg::St => TerminatorMode::St,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SampleWidthArg {
    U8,
    U16,
}

impl From<SampleWidthArg> for SampleWidth {
    fn from(value: SampleWidthArg) -> Self {
        match value {
            SampleWidthArg::U8 => SampleWidth::U8,
            SampleWidthArg::U16 => SampleWidth::U16,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SwitchModeArg {
    Reseed,
    Jump,
}

impl From<SwitchModeArg> for SwitchMode {
    fn from(value: SwitchModeArg) -> Self {
        match value {
            SwitchModeArg::Reseed => SwitchMode::Reseed,
            SwitchModeArg::Jump => SwitchMode::Jump,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IdleModeArg {
    Fade,
    Hold,
    Reset,
}

impl From<IdleModeArg> for IdleMode {
    fn from(value: IdleModeArg) -> Self {
        match value {
            IdleModeArg::Fade => IdleMode::Fade,
            IdleModeArg::Hold => IdleMode::Hold,
            IdleModeArg::Reset => IdleMode::Reset,
        }
    }
}
