use std::io::Write;

use super::{push_palette_batch, push_set, rgb_spec, ChannelMask, Terminator};
use crate::color::{Channel, ChannelMap, ColorFrame, Rgb8};
use crate::{PulseError, Result};

/// Encodes frames and writes each one with a single `write_all`.
///
/// A channel is only re-sent when some RGB component moved by at least
/// `min_delta` since it was last sent. `min_delta == 0` sends every enabled
/// channel on every frame.
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    out: W,
    terminator: Terminator,
    mask: ChannelMask,
    min_delta: u8,
    last_sent: ChannelMap<Rgb8>,
    buffer: Vec<u8>,
    frames_written: u64,
}

impl<W: Write> FrameWriter<W> {
    /// `on_screen` is what the terminal currently shows, normally the
    /// captured baseline.
    pub fn new(
        out: W,
        terminator: Terminator,
        mask: ChannelMask,
        min_delta: u8,
        on_screen: ChannelMap<Rgb8>,
    ) -> Self {
        Self {
            out,
            terminator,
            mask,
            min_delta,
            last_sent: on_screen,
            buffer: Vec::with_capacity(512),
            frames_written: 0,
        }
    }

    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn last_sent(&self) -> &ChannelMap<Rgb8> {
        &self.last_sent
    }

    fn changed(&self, channel: Channel, rgb: Rgb8) -> bool {
        if !self.mask.allows(channel) {
            return false;
        }
        let previous = self.last_sent.get(channel);
        if self.min_delta == 0 {
            return true;
        }
        previous.max_component_delta(rgb) >= self.min_delta
    }

    /// Encodes and writes `frame`. Returns the number of bytes written, zero
    /// when nothing moved far enough to be re-sent.
    pub fn write_frame(&mut self, frame: &ColorFrame) -> Result<usize> {
        let rgb = frame.map(|_, color| color.to_rgb());
        self.buffer.clear();
        let mut sent = Vec::new();

        for channel in [Channel::Background, Channel::Foreground] {
            let value = rgb.get(channel);
            if self.changed(channel, value) {
                push_set(&mut self.buffer, channel, &rgb_spec(value), self.terminator);
                sent.push(channel);
            }
        }

        let palette: Vec<(u8, String)> = Channel::all()
            .filter_map(|channel| match channel {
                Channel::Palette(index) if self.changed(channel, rgb.get(channel)) => {
                    Some((index, rgb_spec(rgb.get(channel))))
                }
                _ => None,
            })
            .collect();
        push_palette_batch(&mut self.buffer, &palette, self.terminator);
        sent.extend(palette.iter().map(|(index, _)| Channel::Palette(*index)));

        if self.buffer.is_empty() {
            return Ok(0);
        }

        self.out
            .write_all(&self.buffer)
            .and_then(|_| self.out.flush())
            .map_err(PulseError::EncodingWrite)?;

        for channel in sent {
            self.last_sent.set(channel, rgb.get(channel));
        }
        self.frames_written += 1;
        tracing::trace!(bytes = self.buffer.len(), "frame written");
        Ok(self.buffer.len())
    }

    /// Writes preformatted bytes in one call, e.g. a restore sequence.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.out
            .write_all(bytes)
            .and_then(|_| self.out.flush())
            .map_err(PulseError::EncodingWrite)
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::color::Color;

    /// Counts `write` calls so batching is observable.
    #[derive(Default)]
    struct Recorder {
        bytes: Vec<u8>,
        writes: usize,
    }

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
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

    fn black() -> ChannelMap<Rgb8> {
        ChannelMap::splat(Rgb8::new(0, 0, 0))
    }

    #[test]
    fn one_write_per_frame_with_palette_batched() {
        let mut writer = FrameWriter::new(Recorder::default(), Terminator::Bel, ChannelMask::ALL, 2, black());
        let frame = ColorFrame::splat(Color::new(0.0, 0.0, 1.0));
        let written = writer.write_frame(&frame).unwrap();
        let out = writer.into_inner();
        assert_eq!(out.writes, 1);
        assert_eq!(written, out.bytes.len());
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.starts_with("\x1b]11;rgb:ffff/ffff/ffff\x07\x1b]10;rgb:ffff/ffff/ffff\x07\x1b]4;0;"));
        assert_eq!(text.matches("\x1b]4;").count(), 1);
        assert!(text.contains(";15;rgb:ffff/ffff/ffff\x07"));
    }

    #[test]
    fn small_moves_are_not_resent() {
        let mut writer = FrameWriter::new(Recorder::default(), Terminator::Bel, ChannelMask::ALL, 2, black());
        let frame = ColorFrame::splat(Color::from_rgb(Rgb8::new(1, 1, 1)));
        assert_eq!(writer.write_frame(&frame).unwrap(), 0);
        let frame = ColorFrame::splat(Color::from_rgb(Rgb8::new(3, 3, 3)));
        assert!(writer.write_frame(&frame).unwrap() > 0);
        assert_eq!(writer.write_frame(&frame).unwrap(), 0);
        assert_eq!(writer.frames_written(), 1);
    }

    #[test]
    fn disabled_channels_are_never_written() {
        let mask = ChannelMask {
            foreground: false,
            background: true,
            palette: false,
        };
        let mut writer = FrameWriter::new(Recorder::default(), Terminator::St, mask, 1, black());
        writer
            .write_frame(&ColorFrame::splat(Color::new(0.0, 1.0, 0.5)))
            .unwrap();
        let text = String::from_utf8(writer.into_inner().bytes).unwrap();
        assert!(text.starts_with("\x1b]11;"));
        assert!(!text.contains("\x1b]10;"));
        assert!(!text.contains("\x1b]4;"));
    }

    #[test]
    fn write_failure_is_an_encoding_error() {
        let mut writer = FrameWriter::new(Broken, Terminator::Bel, ChannelMask::ALL, 1, black());
        let err = writer
            .write_frame(&ColorFrame::splat(Color::new(0.0, 0.0, 1.0)))
            .unwrap_err();
        assert!(matches!(err, PulseError::EncodingWrite(_)));
        assert_eq!(writer.last_sent().foreground, Rgb8::new(0, 0, 0));
    }
}
