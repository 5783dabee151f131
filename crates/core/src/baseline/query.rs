use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::color::{Channel, Rgb8};
use crate::render::osc_code;
use crate::sys::{poll_readable, RawModeGuard};
use crate::{PulseError, Result};

/// Request/response access to a terminal.
pub trait TerminalIo {
    /// Sends `request` and returns whatever arrived before a complete reply
    /// or `timeout`. An empty result means the terminal did not answer.
    fn query(&mut self, request: &[u8], timeout: Duration) -> io::Result<Vec<u8>>;
}

/// [`TerminalIo`] over a tty device, held in raw mode while open.
pub struct TtyQuery {
    file: File,
    _raw: RawModeGuard,
}

impl TtyQuery {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|err| PulseError::msg(format!("cannot open {} for queries: {err}", path.display())))?;
        let raw = RawModeGuard::enable(file.as_raw_fd())?;
        Ok(Self { file, _raw: raw })
    }

    /// Discards stale bytes, e.g. a late reply to an earlier query.
    fn drain(&mut self) {
        let mut scratch = [0u8; 256];
        while let Ok(true) = poll_readable(self.file.as_raw_fd(), Duration::ZERO) {
            match self.file.read(&mut scratch) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }
}

impl TerminalIo for TtyQuery {
    fn query(&mut self, request: &[u8], timeout: Duration) -> io::Result<Vec<u8>> {
        self.drain();
        self.file.write_all(request)?;
        self.file.flush()?;

        let deadline = Instant::now() + timeout;
        let mut reply = Vec::new();
        let mut chunk = [0u8; 256];
        while !reply_complete(&reply) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !poll_readable(self.file.as_raw_fd(), remaining)? {
                break;
            }
            match self.file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => reply.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(reply)
    }
}

/// True once `buf` holds an OSC introducer followed by a terminator.
pub fn reply_complete(buf: &[u8]) -> bool {
    let Some(start) = find(buf, b"\x1b]") else {
        return false;
    };
    let body = &buf[start + 2..];
    body.contains(&0x07) || find(body, b"\x1b\\").is_some()
}

/// Parses a color reply for `channel`.
///
/// Returns the `rgb:...` spec exactly as the terminal sent it, plus its 8-bit
/// value. Components may carry one to four hex digits. Replies addressed to
/// another channel are rejected.
pub fn parse_reply(reply: &[u8], channel: Channel) -> Option<(String, Rgb8)> {
    let start = find(reply, b"\x1b]")? + 2;
    let body = &reply[start..];
    let end = body
        .iter()
        .position(|&b| b == 0x07 || b == 0x1b)
        .unwrap_or(body.len());
    let body = std::str::from_utf8(&body[..end]).ok()?;

    let prefix = format!("{};", osc_code(channel));
    let spec = body.strip_prefix(&prefix)?;
    let components = spec.strip_prefix("rgb:")?;

    let mut parts = components.split('/');
    let r = scale_component(parts.next()?)?;
    let g = scale_component(parts.next()?)?;
    let b = scale_component(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some((spec.to_string(), Rgb8::new(r, g, b)))
}

fn scale_component(hex: &str) -> Option<u8> {
    if hex.is_empty() || hex.len() > 4 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let value = u32::from_str_radix(hex, 16).ok()?;
    let max = (1u32 << (4 * hex.len())) - 1;
    Some(((value * 255 + max / 2) / max) as u8)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
