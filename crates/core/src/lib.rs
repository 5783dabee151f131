//! Core library for Palette Pulse.
//!
//! Turns a live audio spectrum into a stream of terminal color changes.
//! Each module owns one stage of the pipeline: spectrum input, band
//! analysis, effects, scenes, readability constraints, escape-sequence
//! output and the baseline that is put back on exit. [`engine::Engine`]
//! wires the pure stages together and [`runtime::Runtime`] adds the
//! threads and the terminal.

pub mod analysis;
pub mod audio;
pub mod baseline;
pub mod color;
pub mod config;
pub mod constraints;
pub mod effects;
pub mod engine;
pub mod error;
pub mod render;
pub mod runtime;
pub mod scene;
pub mod timeline;

mod sys;

pub use analysis::{ActivitySignal, BandExtractor, BandLayout, EnergyState, RawEnergy, SmootherBank};
pub use audio::{FifoReader, FrameSlot, SampleWidth, SpectrumFrame};
pub use baseline::{BaselineManager, CapturedBaseline, RestoreOutcome, TerminalIo};
pub use color::{Channel, ChannelMap, Color, ColorFrame, Rgb8};
pub use config::AppConfig;
pub use constraints::{ConstraintPipeline, ConstraintSettings, IdleMode, Protection};
pub use effects::{EffectDescriptor, EffectRegistry};
pub use engine::Engine;
pub use error::{PulseError, Result};
pub use render::{FrameWriter, Terminator, TerminatorMode};
pub use runtime::{Control, RunReport, Runtime, StopReason};
pub use scene::{Scene, SceneDescriptor, SceneLibrary, SwitchMode};
pub use timeline::{FramePacer, PlaybackClock};
