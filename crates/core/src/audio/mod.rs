//! Spectrum input: fixed-width frame decoding and the shared latest-frame slot.

mod fifo;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::{PulseError, Result};

pub use fifo::FifoReader;

/// Width of one bar value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleWidth {
    #[default]
    U8,
    /// Little-endian 16-bit values.
    U16,
}

impl SampleWidth {
    pub fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
        }
    }

    pub fn full_scale(self) -> u16 {
        match self {
            Self::U8 => u8::MAX as u16,
            Self::U16 => u16::MAX,
        }
    }
}

/// One frame of raw bar amplitudes, ordered low to high frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    samples: Vec<u16>,
    full_scale: u16,
}

impl SpectrumFrame {
    pub fn new(samples: Vec<u16>, full_scale: u16) -> Self {
        Self {
            samples,
            full_scale: full_scale.max(1),
        }
    }

    pub fn from_u8(samples: &[u8]) -> Self {
        Self::new(samples.iter().map(|&v| v as u16).collect(), u8::MAX as u16)
    }

    /// An all-zero frame, used whenever the source is missing or closed.
    pub fn silence(bars: usize, width: SampleWidth) -> Self {
        Self::new(vec![0; bars], width.full_scale())
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn full_scale(&self) -> u16 {
        self.full_scale
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&v| v == 0)
    }
}

/// Splits a byte stream into fixed-size frames of `bars` samples.
#[derive(Debug)]
pub struct FrameDecoder {
    bars: usize,
    width: SampleWidth,
    pending: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(bars: usize, width: SampleWidth) -> Self {
        Self {
            bars,
            width,
            pending: Vec::with_capacity(bars * width.bytes() * 2),
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.bars * self.width.bytes()
    }

    /// Buffers `bytes` and returns the newest complete frame, if any. Older
    /// complete frames in the same chunk are dropped; consumers only ever
    /// want the latest.
    pub fn push(&mut self, bytes: &[u8]) -> Option<SpectrumFrame> {
        self.pending.extend_from_slice(bytes);
        let size = self.frame_bytes();
        if size == 0 || self.pending.len() < size {
            return None;
        }

        let complete = self.pending.len() / size;
        let start = (complete - 1) * size;
        let frame = self.decode(&self.pending[start..start + size]);
        self.pending.drain(..complete * size);
        Some(frame)
    }

    fn decode(&self, raw: &[u8]) -> SpectrumFrame {
        let samples = match self.width {
            SampleWidth::U8 => raw.iter().map(|&b| b as u16).collect(),
            SampleWidth::U16 => raw
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        };
        SpectrumFrame::new(samples, self.width.full_scale())
    }
}

#[derive(Debug, Default)]
struct SlotState {
    sequence: u64,
    frame: Option<SpectrumFrame>,
}

/// Shared "latest frame" cell written by the reader thread and polled by the
/// tick loop. The lock is only held long enough to swap or clone a frame.
#[derive(Clone, Default)]
pub struct FrameSlot {
    shared: Arc<Mutex<SlotState>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the latest frame and returns its sequence number.
    pub fn publish(&self, frame: SpectrumFrame) -> Result<u64> {
        let mut slot = self.lock()?;
        slot.sequence += 1;
        slot.frame = Some(frame);
        Ok(slot.sequence)
    }

    /// Returns the latest frame if it is newer than `seen`.
    pub fn latest_after(&self, seen: u64) -> Result<Option<(u64, SpectrumFrame)>> {
        let slot = self.lock()?;
        if slot.sequence <= seen {
            return Ok(None);
        }
        Ok(slot.frame.clone().map(|frame| (slot.sequence, frame)))
    }

    pub fn sequence(&self) -> Result<u64> {
        Ok(self.lock()?.sequence)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SlotState>> {
        self.shared
            .lock()
            .map_err(|_| PulseError::msg("spectrum frame slot has been poisoned"))
    }
}

impl std::fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSlot").finish()
    }
}
