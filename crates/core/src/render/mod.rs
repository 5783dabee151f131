//! OSC escape-sequence encoding and the batched frame writer.

mod writer;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::{Channel, Rgb8};
use crate::config::OutputConfig;

pub use writer::FrameWriter;

const OSC: &[u8] = b"\x1b]";

/// Escape-sequence terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// `BEL` (`\a`).
    Bel,
    /// String terminator, `ESC \`.
    St,
}

impl Terminator {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Terminator::Bel => b"\x07",
            Terminator::St => b"\x1b\\",
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Bel => f.write_str("bel"),
            Terminator::St => f.write_str("st"),
        }
    }
}

/// Configured terminator choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminatorMode {
    /// Detect during baseline capture (ST first, then BEL).
    #[default]
    Auto,
    Bel,
    St,
}

impl TerminatorMode {
    pub fn fixed(self) -> Option<Terminator> {
        match self {
            TerminatorMode::Auto => None,
            TerminatorMode::Bel => Some(Terminator::Bel),
            TerminatorMode::St => Some(Terminator::St),
        }
    }

    /// Terminators to try, in order.
    pub fn candidates(self) -> &'static [Terminator] {
        match self {
            TerminatorMode::Auto => &[Terminator::St, Terminator::Bel],
            TerminatorMode::Bel => &[Terminator::Bel],
            TerminatorMode::St => &[Terminator::St],
        }
    }
}

/// Which channel kinds may be written to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMask {
    pub foreground: bool,
    pub background: bool,
    pub palette: bool,
}

impl ChannelMask {
    pub const ALL: ChannelMask = ChannelMask {
        foreground: true,
        background: true,
        palette: true,
    };

    pub fn from_config(config: &OutputConfig) -> Self {
        Self {
            foreground: config.foreground,
            background: config.background,
            palette: config.palette,
        }
    }

    pub fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Foreground => self.foreground,
            Channel::Background => self.background,
            Channel::Palette(_) => self.palette,
        }
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// `rgb:RRRR/GGGG/BBBB`, each byte repeated to fill 16 bits.
pub fn rgb_spec(rgb: Rgb8) -> String {
    format!(
        "rgb:{0:02x}{0:02x}/{1:02x}{1:02x}/{2:02x}{2:02x}",
        rgb.r, rgb.g, rgb.b
    )
}

/// OSC code addressing `channel`: `10`, `11` or `4;<index>`.
pub fn osc_code(channel: Channel) -> String {
    match channel {
        Channel::Foreground => "10".to_string(),
        Channel::Background => "11".to_string(),
        Channel::Palette(index) => format!("4;{index}"),
    }
}

/// Appends `ESC ] <body> <terminator>`.
pub fn push_osc(out: &mut Vec<u8>, body: &str, terminator: Terminator) {
    out.extend_from_slice(OSC);
    out.extend_from_slice(body.as_bytes());
    out.extend_from_slice(terminator.as_bytes());
}

/// Appends the set sequence for a single channel with a preformatted spec.
pub fn push_set(out: &mut Vec<u8>, channel: Channel, spec: &str, terminator: Terminator) {
    push_osc(out, &format!("{};{spec}", osc_code(channel)), terminator);
}

/// Appends one `4;i;spec;j;spec...` sequence covering every entry.
pub fn push_palette_batch(out: &mut Vec<u8>, entries: &[(u8, String)], terminator: Terminator) {
    if entries.is_empty() {
        return;
    }
    let body = entries
        .iter()
        .map(|(index, spec)| format!("{index};{spec}"))
        .collect::<Vec<_>>()
        .join(";");
    push_osc(out, &format!("4;{body}"), terminator);
}

pub fn query_sequence(channel: Channel, terminator: Terminator) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    push_osc(&mut out, &format!("{};?", osc_code(channel)), terminator);
    out
}

/// Resets palette, foreground, background and cursor color to the
/// terminal's own defaults.
pub fn reset_sequence(terminator: Terminator) -> Vec<u8> {
    let mut out = Vec::with_capacity(24);
    for code in ["104", "110", "111", "112"] {
        push_osc(&mut out, code, terminator);
    }
    out
}
