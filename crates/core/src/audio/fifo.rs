use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::{FrameDecoder, FrameSlot, SampleWidth, SpectrumFrame};
use crate::config::SourceConfig;
use crate::sys::poll_readable;
use crate::{PulseError, Result};

const READ_CHUNK: usize = 4096;

/// Reads fixed-width spectrum frames from a named pipe and publishes the
/// newest one into a [`FrameSlot`].
///
/// The pipe is opened non-blocking and every wait is a bounded `poll`, so
/// [`FifoReader::run`] notices `stop` within one poll interval even when no
/// producer is attached. A missing, closed or failing source keeps
/// publishing silent frames instead of ending the run.
#[derive(Debug, Clone)]
pub struct FifoReader {
    path: PathBuf,
    bars: usize,
    width: SampleWidth,
    poll_interval: Duration,
}

impl FifoReader {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            path: config.fifo.clone(),
            bars: config.bars,
            width: config.sample_width,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
            .map_err(|err| {
                PulseError::SourceUnavailable(format!("{}: {err}", self.path.display()))
            })
    }

    /// Runs until `stop` is set.
    pub fn run(&self, slot: &FrameSlot, stop: &AtomicBool) {
        let file = match self.open() {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(%err, "spectrum source missing, treating as silence");
                self.publish_silence(slot);
                self.idle_until(slot, stop);
                return;
            }
        };
        tracing::info!(path = %self.path.display(), bars = self.bars, "reading spectrum frames");
        self.read_loop(file, slot, stop);
        tracing::debug!("spectrum reader stopped");
    }

    fn read_loop(&self, mut file: File, slot: &FrameSlot, stop: &AtomicBool) {
        let fd = file.as_raw_fd();
        let mut decoder = FrameDecoder::new(self.bars, self.width);
        let mut buf = [0u8; READ_CHUNK];
        let mut silent = false;

        while !stop.load(Ordering::Relaxed) {
            match poll_readable(fd, self.poll_interval) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(err) => {
                    tracing::warn!(%err, "polling spectrum source failed");
                    silent = self.go_silent(slot, silent);
                    thread::sleep(self.poll_interval);
                    continue;
                }
            }

            match file.read(&mut buf) {
                Ok(0) => {
                    // No producer attached. The fd stays open so a restarted
                    // producer reconnects without reopening.
                    silent = self.go_silent(slot, silent);
                    thread::sleep(self.poll_interval);
                }
                Ok(n) => {
                    if let Some(frame) = decoder.push(&buf[..n]) {
                        silent = false;
                        if let Err(err) = slot.publish(frame) {
                            tracing::error!(%err, "dropping spectrum frame");
                        }
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(err) => {
                    tracing::warn!(%err, "reading spectrum source failed");
                    silent = self.go_silent(slot, silent);
                    thread::sleep(self.poll_interval);
                }
            }
        }
    }

    /// Keeps publishing zero frames while the source is idle so smoothing
    /// decays instead of freezing on the last sound.
    fn go_silent(&self, slot: &FrameSlot, already_silent: bool) -> bool {
        if !already_silent {
            tracing::debug!("spectrum source idle, publishing silence");
        }
        self.publish_silence(slot);
        true
    }

    fn publish_silence(&self, slot: &FrameSlot) {
        if let Err(err) = slot.publish(SpectrumFrame::silence(self.bars, self.width)) {
            tracing::error!(%err, "failed to publish silence");
        }
    }

    fn idle_until(&self, slot: &FrameSlot, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) {
            thread::sleep(self.poll_interval);
            self.publish_silence(slot);
        }
    }
}
