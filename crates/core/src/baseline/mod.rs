//! Captures the terminal's colors at startup and puts them back on exit.

mod query;

use std::io::Write;

use crate::color::{Channel, ChannelMap, ColorFrame, Color, Rgb8, PALETTE_SIZE};
use crate::config::BaselineConfig;
use crate::render::{
    osc_code, push_osc, push_palette_batch, push_set, query_sequence, Terminator, TerminatorMode,
};
use crate::PulseError;

pub use query::{parse_reply, reply_complete, TerminalIo, TtyQuery};

/// Attempts per channel before falling back.
const QUERY_ATTEMPTS: usize = 2;
const SLOTS: usize = 2 + PALETTE_SIZE;

/// Lifecycle of the captured colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineState {
    Uncaptured,
    Captured,
    Restoring,
    Restored,
}

/// Result of a restore request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// Restore already ran (or is running); nothing was written.
    AlreadyRestored,
    /// The write failed. The error has been logged.
    Failed,
    /// Nothing was captured, so the terminal was never modified.
    NotCaptured,
}

impl RestoreOutcome {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            RestoreOutcome::Restored | RestoreOutcome::AlreadyRestored | RestoreOutcome::NotCaptured
        )
    }
}

fn slot(channel: Channel) -> usize {
    match channel {
        Channel::Foreground => 0,
        Channel::Background => 1,
        Channel::Palette(index) => 2 + index as usize,
    }
}

/// The colors found at startup.
///
/// Queried channels keep the terminal's reply text verbatim so restore
/// writes back exactly what was read. Channels that fell back carry no raw
/// text and are restored with the terminal's reset sequences instead.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedBaseline {
    terminator: Terminator,
    rgb: ChannelMap<Rgb8>,
    raw: [Option<String>; SLOTS],
}

impl CapturedBaseline {
    /// A baseline made entirely of configured fallback colors.
    pub fn fallback(config: &BaselineConfig, terminator: Terminator) -> Self {
        let mut rgb = ChannelMap::splat(Rgb8::new(0, 0, 0));
        rgb.foreground = config.fallback_foreground;
        rgb.background = config.fallback_background;
        for (i, color) in config.fallback_palette.iter().take(PALETTE_SIZE).enumerate() {
            rgb.palette[i] = *color;
        }
        Self {
            terminator,
            rgb,
            raw: std::array::from_fn(|_| None),
        }
    }

    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    pub fn rgb(&self) -> &ChannelMap<Rgb8> {
        &self.rgb
    }

    /// Baseline in the engine's color space.
    pub fn colors(&self) -> ColorFrame {
        self.rgb.map(|_, rgb| Color::from_rgb(rgb))
    }

    pub fn raw_spec(&self, channel: Channel) -> Option<&str> {
        self.raw[slot(channel)].as_deref()
    }

    pub fn is_queried(&self, channel: Channel) -> bool {
        self.raw[slot(channel)].is_some()
    }

    pub fn fallback_channels(&self) -> Vec<Channel> {
        Channel::all().filter(|c| !self.is_queried(*c)).collect()
    }

    fn record(&mut self, channel: Channel, spec: String, rgb: Rgb8) {
        self.rgb.set(channel, rgb);
        self.raw[slot(channel)] = Some(spec);
    }

    /// Bytes that return the terminal to this baseline.
    pub fn restore_sequence(&self) -> Vec<u8> {
        let term = self.terminator;
        let mut out = Vec::with_capacity(64 + 32 * PALETTE_SIZE);

        for (channel, reset) in [(Channel::Foreground, "110"), (Channel::Background, "111")] {
            match self.raw_spec(channel) {
                Some(spec) => push_set(&mut out, channel, spec, term),
                None => push_osc(&mut out, reset, term),
            }
        }

        let queried: Vec<(u8, String)> = (0..PALETTE_SIZE as u8)
            .filter_map(|i| {
                self.raw_spec(Channel::Palette(i))
                    .map(|spec| (i, spec.to_string()))
            })
            .collect();
        if queried.is_empty() {
            push_osc(&mut out, "104", term);
        } else {
            push_palette_batch(&mut out, &queried, term);
            for i in (0..PALETTE_SIZE as u8).filter(|&i| !self.is_queried(Channel::Palette(i))) {
                push_osc(&mut out, &format!("104;{i}"), term);
            }
        }
        out
    }
}

/// Owns the capture/restore state machine.
#[derive(Debug)]
pub struct BaselineManager {
    state: BaselineState,
    captured: Option<CapturedBaseline>,
}

impl BaselineManager {
    pub fn new() -> Self {
        Self {
            state: BaselineState::Uncaptured,
            captured: None,
        }
    }

    pub fn state(&self) -> BaselineState {
        self.state
    }

    pub fn captured(&self) -> Option<&CapturedBaseline> {
        self.captured.as_ref()
    }

    /// Captures the baseline once. Later calls return the first capture.
    ///
    /// With `io` absent or queries disabled, every channel uses its fallback.
    /// Query timeouts never fail the capture; they are logged once and the
    /// affected channels fall back.
    pub fn capture(
        &mut self,
        io: Option<&mut dyn TerminalIo>,
        config: &BaselineConfig,
        mode: TerminatorMode,
    ) -> &CapturedBaseline {
        if self.captured.is_none() {
            let captured = match io {
                Some(io) if config.query => query_baseline(io, config, mode),
                _ => {
                    tracing::info!("baseline queries disabled, using configured colors");
                    CapturedBaseline::fallback(config, mode.fixed().unwrap_or(Terminator::Bel))
                }
            };
            self.state = BaselineState::Captured;
            self.captured = Some(captured);
        }
        self.captured
            .get_or_insert_with(|| CapturedBaseline::fallback(config, Terminator::Bel))
    }

    /// Writes the restore sequence at most once per run. Failures are logged
    /// and reported through the outcome, never returned as errors.
    pub fn restore(&mut self, out: &mut dyn Write) -> RestoreOutcome {
        match self.state {
            BaselineState::Uncaptured => return RestoreOutcome::NotCaptured,
            BaselineState::Restoring | BaselineState::Restored => {
                return RestoreOutcome::AlreadyRestored
            }
            BaselineState::Captured => {}
        }
        let Some(captured) = self.captured.as_ref() else {
            return RestoreOutcome::NotCaptured;
        };

        self.state = BaselineState::Restoring;
        let bytes = captured.restore_sequence();
        let result = out.write_all(&bytes).and_then(|_| out.flush());
        self.state = BaselineState::Restored;

        match result {
            Ok(()) => {
                tracing::info!(bytes = bytes.len(), "terminal colors restored");
                RestoreOutcome::Restored
            }
            Err(err) => {
                tracing::error!(error = %PulseError::EncodingWrite(err), "restoring terminal colors failed");
                RestoreOutcome::Failed
            }
        }
    }
}

impl Default for BaselineManager {
    fn default() -> Self {
        Self::new()
    }
}

fn query_channel(
    io: &mut dyn TerminalIo,
    channel: Channel,
    terminator: Terminator,
    config: &BaselineConfig,
) -> Option<(String, Rgb8)> {
    let request = query_sequence(channel, terminator);
    for attempt in 1..=QUERY_ATTEMPTS {
        match io.query(&request, config.timeout()) {
            Ok(reply) => {
                if let Some(parsed) = parse_reply(&reply, channel) {
                    return Some(parsed);
                }
                tracing::trace!(%channel, attempt, %terminator, "no usable reply");
            }
            Err(err) => {
                tracing::debug!(%channel, attempt, %err, "color query failed");
            }
        }
    }
    None
}

fn query_baseline(
    io: &mut dyn TerminalIo,
    config: &BaselineConfig,
    mode: TerminatorMode,
) -> CapturedBaseline {
    let candidates = mode.candidates();
    for &terminator in candidates {
        let fg = query_channel(io, Channel::Foreground, terminator, config);
        let bg = query_channel(io, Channel::Background, terminator, config);
        if fg.is_none() && bg.is_none() {
            continue;
        }

        let mut captured = CapturedBaseline::fallback(config, terminator);
        for (channel, reply) in [(Channel::Foreground, fg), (Channel::Background, bg)] {
            if let Some((spec, rgb)) = reply {
                captured.record(channel, spec, rgb);
            }
        }
        for index in 0..PALETTE_SIZE as u8 {
            let channel = Channel::Palette(index);
            match query_channel(io, channel, terminator, config) {
                Some((spec, rgb)) => captured.record(channel, spec, rgb),
                // A terminal that ignores the first palette query ignores them all.
                None if index == 0 => break,
                None => {}
            }
        }

        let missing = captured.fallback_channels();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|c| osc_code(*c)).collect();
            tracing::warn!(
                error = %PulseError::BaselineQueryTimeout(names.join(", ")),
                "using fallback colors for unanswered channels"
            );
        }
        tracing::info!(%terminator, queried = SLOTS - missing.len(), "baseline captured");
        return captured;
    }

    let terminator = candidates.last().copied().unwrap_or(Terminator::Bel);
    tracing::warn!(
        error = %PulseError::BaselineQueryTimeout("all channels".into()),
        "terminal did not answer color queries, using fallback colors"
    );
    CapturedBaseline::fallback(config, terminator)
}

#[cfg(test)]
pub(crate) mod fake {
    use std::io;
    use std::time::Duration;

    use super::TerminalIo;

    /// Answers queries from a fixed table of `request -> reply`.
    #[derive(Default)]
    pub struct ScriptedTerminal {
        pub answers: Vec<(Vec<u8>, Vec<u8>)>,
        pub requests: Vec<Vec<u8>>,
    }

    impl ScriptedTerminal {
        pub fn answer(mut self, request: &[u8], reply: &[u8]) -> Self {
            self.answers.push((request.to_vec(), reply.to_vec()));
            self
        }
    }

    impl TerminalIo for ScriptedTerminal {
        fn query(&mut self, request: &[u8], _timeout: Duration) -> io::Result<Vec<u8>> {
            self.requests.push(request.to_vec());
            Ok(self
                .answers
                .iter()
                .find(|(req, _)| req == request)
                .map(|(_, reply)| reply.clone())
                .unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::fake::ScriptedTerminal;
    use super::*;

    fn full_terminal(term: &[u8]) -> ScriptedTerminal {
        let mut t = ScriptedTerminal::default()
            .answer(
                &[&b"\x1b]10;?"[..], term].concat(),
                &[&b"\x1b]10;rgb:d0d0/d0d0/d0d0"[..], term].concat(),
            )
            .answer(
                &[&b"\x1b]11;?"[..], term].concat(),
                &[&b"\x1b]11;rgb:1a1a/1b1b/2626"[..], term].concat(),
            );
        for i in 0..16 {
            let request = [format!("\x1b]4;{i};?").as_bytes(), term].concat();
            let reply = format!("\x1b]4;{i};rgb:{0:02x}{0:02x}/0000/0000", i * 16);
            t = t.answer(&request, &[reply.as_bytes(), term].concat());
        }
        t
    }

    #[test]
    fn auto_mode_prefers_st_and_falls_back_to_bel() {
        let mut terminal = full_terminal(b"\x07");
        let mut manager = BaselineManager::new();
        let captured = manager
            .capture(Some(&mut terminal), &BaselineConfig::default(), TerminatorMode::Auto)
            .clone();
        assert_eq!(captured.terminator(), Terminator::Bel);
        assert_eq!(captured.rgb().background, Rgb8::new(0x1a, 0x1b, 0x26));
        assert!(captured.fallback_channels().is_empty());
        // Two ST attempts for each of fg and bg happen before BEL is tried.
        assert_eq!(terminal.requests[0], b"\x1b]10;?\x1b\\");
        assert_eq!(manager.state(), BaselineState::Captured);
    }

    #[test]
    fn silent_terminal_falls_back_without_failing() {
        let mut terminal = ScriptedTerminal::default();
        let config = BaselineConfig::default();
        let mut manager = BaselineManager::new();
        let captured = manager
            .capture(Some(&mut terminal), &config, TerminatorMode::Auto)
            .clone();
        assert_eq!(captured.rgb().foreground, config.fallback_foreground);
        assert_eq!(captured.fallback_channels().len(), 18);
        // fg and bg, two attempts each, for both terminators.
        assert_eq!(terminal.requests.len(), 8);
        assert_eq!(
            captured.restore_sequence(),
            b"\x1b]110\x07\x1b]111\x07\x1b]104\x07".to_vec()
        );
    }

    #[test]
    fn restore_replays_the_captured_text() {
        let mut terminal = full_terminal(b"\x1b\\");
        let mut manager = BaselineManager::new();
        manager.capture(Some(&mut terminal), &BaselineConfig::default(), TerminatorMode::St);
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(manager.restore(&mut out), RestoreOutcome::Restored);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("\x1b]10;rgb:d0d0/d0d0/d0d0\x1b\\\x1b]11;rgb:1a1a/1b1b/2626\x1b\\"));
        assert!(text.contains("\x1b]4;0;rgb:0000/0000/0000;1;rgb:1010/0000/0000;"));
    }

    #[test]
    fn partial_palette_resets_missing_entries() {
        let mut terminal = ScriptedTerminal::default()
            .answer(b"\x1b]10;?\x07", b"\x1b]10;rgb:ff/ff/ff\x07")
            .answer(b"\x1b]11;?\x07", b"\x1b]11;rgb:00/00/00\x07")
            .answer(b"\x1b]4;0;?\x07", b"\x1b]4;0;rgb:00/00/00\x07");
        let mut manager = BaselineManager::new();
        let captured = manager
            .capture(Some(&mut terminal), &BaselineConfig::default(), TerminatorMode::Bel)
            .clone();
        assert!(captured.is_queried(Channel::Palette(0)));
        assert!(!captured.is_queried(Channel::Palette(1)));
        let restore = String::from_utf8(captured.restore_sequence()).unwrap();
        assert!(restore.contains("\x1b]4;0;rgb:00/00/00\x07"));
        assert!(restore.contains("\x1b]104;1\x07"));
        assert!(restore.contains("\x1b]104;15\x07"));
    }

    #[test]
    fn restore_runs_at_most_once_and_swallows_errors() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut manager = BaselineManager::new();
        assert_eq!(manager.restore(&mut Vec::<u8>::new()), RestoreOutcome::NotCaptured);

        manager.capture(None, &BaselineConfig::default(), TerminatorMode::Auto);
        assert_eq!(manager.restore(&mut Closed), RestoreOutcome::Failed);
        assert_eq!(manager.state(), BaselineState::Restored);
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(manager.restore(&mut out), RestoreOutcome::AlreadyRestored);
        assert!(out.is_empty());
    }
}
