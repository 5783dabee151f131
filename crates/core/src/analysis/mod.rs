//! Reduces spectrum frames to smoothed perceptual energies.

mod activity;
mod smoother;

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::audio::SpectrumFrame;
use crate::config::{BandRange, BandsConfig};

pub use activity::{ActivitySignal, ActivityTracker};
pub use smoother::{Ema, Envelope, SmootherBank};

/// Number of coarse spectrum bands kept alongside bass/mid/treble.
pub const SUMMARY_BANDS: usize = 16;

const GLOBAL_WEIGHTS: [f32; 3] = [0.45, 0.35, 0.20];
const BEAT_BASS_THRESHOLD: f32 = 0.78;
const BEAT_GLOBAL_THRESHOLD: f32 = 0.40;

/// Unsmoothed energies of one spectrum frame, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawEnergy {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub global: f32,
    pub bands: [f32; SUMMARY_BANDS],
}

/// Smoothed energies consumed by effects. Every field is in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EnergyState {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    /// Weighted mix of bass, mid and treble.
    pub global: f32,
    /// Attack/release envelope over `global`.
    pub impact: f32,
    pub bands: [f32; SUMMARY_BANDS],
}

impl EnergyState {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn beat(&self) -> bool {
        self.bass > BEAT_BASS_THRESHOLD && self.global > BEAT_GLOBAL_THRESHOLD
    }

    /// Energy-weighted mean band position in `[0, 1]` (0 = lowest band).
    pub fn centroid(&self) -> f32 {
        let total: f32 = self.bands.iter().sum();
        if total <= f32::EPSILON {
            return 0.0;
        }
        let last = (SUMMARY_BANDS - 1) as f32;
        let weighted: f32 = self
            .bands
            .iter()
            .enumerate()
            .map(|(i, energy)| (i as f32 / last) * energy)
            .sum();
        (weighted / total).clamp(0.0, 1.0)
    }
}

/// Index ranges for each band, computed once per run from fractional bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BandLayout {
    bars: usize,
    bass: Range<usize>,
    mid: Range<usize>,
    treble: Range<usize>,
    summary: [Range<usize>; SUMMARY_BANDS],
}

impl BandLayout {
    pub fn new(bars: usize, bands: &BandsConfig) -> Self {
        let group = (bars / SUMMARY_BANDS).max(1);
        let summary = std::array::from_fn(|i| {
            let start = (i * group).min(bars);
            let end = if i == SUMMARY_BANDS - 1 {
                bars
            } else {
                ((i + 1) * group).min(bars)
            };
            start..end.max(start)
        });

        Self {
            bars,
            bass: index_range(bands.bass, bars),
            mid: index_range(bands.mid, bars),
            treble: index_range(bands.treble, bars),
            summary,
        }
    }

    pub fn bars(&self) -> usize {
        self.bars
    }

    pub fn bass(&self) -> Range<usize> {
        self.bass.clone()
    }

    pub fn mid(&self) -> Range<usize> {
        self.mid.clone()
    }

    pub fn treble(&self) -> Range<usize> {
        self.treble.clone()
    }
}

fn index_range(range: BandRange, bars: usize) -> Range<usize> {
    let to_index = |x: f32| ((x.clamp(0.0, 1.0) * bars as f32) as usize).min(bars);
    let (mut lo, mut hi) = (to_index(range.start), to_index(range.end));
    if hi < lo {
        std::mem::swap(&mut lo, &mut hi);
    }
    // Every configured band covers at least one bar when the frame has one.
    let hi = hi.max(lo + 1).min(bars);
    let lo = lo.min(hi.saturating_sub(1));
    lo..hi
}

/// Reduces frames to [`RawEnergy`] using the mean of each band.
#[derive(Debug, Clone)]
pub struct BandExtractor {
    layout: BandLayout,
}

impl BandExtractor {
    pub fn new(layout: BandLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    pub fn extract(&self, frame: &SpectrumFrame) -> RawEnergy {
        let scale = frame.full_scale() as f32;
        let samples = frame.samples();
        let band = |range: &Range<usize>| mean_energy(samples, range, scale);

        let bass = band(&self.layout.bass);
        let mid = band(&self.layout.mid);
        let treble = band(&self.layout.treble);
        let global = (GLOBAL_WEIGHTS[0] * bass + GLOBAL_WEIGHTS[1] * mid + GLOBAL_WEIGHTS[2] * treble)
            .clamp(0.0, 1.0);

        RawEnergy {
            bass,
            mid,
            treble,
            global,
            bands: std::array::from_fn(|i| band(&self.layout.summary[i])),
        }
    }
}

/// Mean of `samples[range]` normalised by `scale`. Empty or out-of-bounds
/// ranges yield exactly zero.
fn mean_energy(samples: &[u16], range: &Range<usize>, scale: f32) -> f32 {
    let end = range.end.min(samples.len());
    let start = range.start.min(end);
    let slice = &samples[start..end];
    if slice.is_empty() || scale <= 0.0 {
        return 0.0;
    }
    let sum: u64 = slice.iter().map(|&v| v as u64).sum();
    ((sum as f64 / slice.len() as f64) / scale as f64).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(bars: usize) -> BandExtractor {
        BandExtractor::new(BandLayout::new(bars, &BandsConfig::default()))
    }

    #[test]
    fn silence_reduces_to_exact_zero() {
        let energy = extractor(64).extract(&SpectrumFrame::from_u8(&[0; 64]));
        assert_eq!((energy.bass, energy.mid, energy.treble), (0.0, 0.0, 0.0));
        assert_eq!(energy.global, 0.0);
        assert!(energy.bands.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn default_layout_partitions_64_bars() {
        let layout = BandLayout::new(64, &BandsConfig::default());
        assert_eq!(layout.bass(), 0..11);
        assert_eq!(layout.mid(), 11..35);
        assert_eq!(layout.treble(), 35..64);
        assert_eq!(layout.summary[0], 0..4);
        assert_eq!(layout.summary[15], 60..64);
    }

    #[test]
    fn bands_use_the_mean_of_their_bars() {
        let mut samples = [0u8; 64];
        samples[..11].fill(255);
        samples[35..].fill(51);
        let energy = extractor(64).extract(&SpectrumFrame::from_u8(&samples));
        assert!((energy.bass - 1.0).abs() < 1e-6);
        assert_eq!(energy.mid, 0.0);
        assert!((energy.treble - 0.2).abs() < 1e-6);
        assert!((energy.global - (0.45 + 0.2 * 0.2)).abs() < 1e-6);
    }

    #[test]
    fn short_frames_do_not_divide_by_zero() {
        let ex = extractor(64);
        let energy = ex.extract(&SpectrumFrame::from_u8(&[200; 3]));
        assert!(energy.bass > 0.0);
        assert_eq!(energy.treble, 0.0);
        assert!(!energy.global.is_nan());

        let tiny = BandExtractor::new(BandLayout::new(2, &BandsConfig::default()));
        let energy = tiny.extract(&SpectrumFrame::from_u8(&[255, 0]));
        assert!(energy.bands.iter().all(|b| b.is_finite()));
    }

    #[test]
    fn centroid_tracks_band_position() {
        let mut state = EnergyState::silent();
        assert_eq!(state.centroid(), 0.0);
        state.bands[15] = 1.0;
        assert!((state.centroid() - 1.0).abs() < 1e-6);
        state.bands[0] = 1.0;
        assert!((state.centroid() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn beat_requires_strong_bass_and_overall_level() {
        let mut state = EnergyState {
            bass: 0.9,
            global: 0.5,
            ..EnergyState::silent()
        };
        assert!(state.beat());
        state.global = 0.2;
        assert!(!state.beat());
    }
}
