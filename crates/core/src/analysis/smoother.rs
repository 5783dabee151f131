use super::{EnergyState, RawEnergy, SUMMARY_BANDS};
use crate::config::SmoothingConfig;

/// Converts a time constant into the per-update blend factor for a step of
/// `dt` seconds, so smoothing behaves the same at any frame rate.
pub fn alpha_for(time_constant: f32, dt: f32) -> f32 {
    if time_constant <= 0.0 {
        return 1.0;
    }
    if dt <= 0.0 || !dt.is_finite() {
        return 0.0;
    }
    (1.0 - (-dt / time_constant).exp()).clamp(0.0, 1.0)
}

/// Blends `prev` toward `input` by `alpha`. The result never leaves the
/// interval spanned by the two values.
fn convex(prev: f32, input: f32, alpha: f32) -> f32 {
    let value = prev * (1.0 - alpha) + input * alpha;
    value.clamp(prev.min(input), prev.max(input))
}

/// One-pole exponential moving average.
///
/// The first sample primes the filter directly so there is no ramp-in from
/// zero.
#[derive(Debug, Clone)]
pub struct Ema {
    time_constant: f32,
    value: Option<f32>,
    cached: Option<(f32, f32)>,
}

impl Ema {
    pub fn new(time_constant: f32) -> Self {
        Self {
            time_constant,
            value: None,
            cached: None,
        }
    }

    pub fn update(&mut self, input: f32, dt: f32) -> f32 {
        let next = match self.value {
            None => input,
            Some(prev) => {
                let alpha = self.alpha(dt);
                convex(prev, input, alpha)
            }
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> f32 {
        self.value.unwrap_or(0.0)
    }

    pub fn is_primed(&self) -> bool {
        self.value.is_some()
    }

    pub fn reset(&mut self) {
        self.value = None;
    }

    fn alpha(&mut self, dt: f32) -> f32 {
        match self.cached {
            Some((cached_dt, alpha)) if cached_dt == dt => alpha,
            _ => {
                let alpha = alpha_for(self.time_constant, dt);
                self.cached = Some((dt, alpha));
                alpha
            }
        }
    }
}

/// Follower with separate rise (attack) and fall (release) time constants.
#[derive(Debug, Clone)]
pub struct Envelope {
    attack: f32,
    release: f32,
    value: Option<f32>,
}

impl Envelope {
    pub fn new(attack: f32, release: f32) -> Self {
        Self {
            attack,
            release,
            value: None,
        }
    }

    pub fn update(&mut self, input: f32, dt: f32) -> f32 {
        let next = match self.value {
            None => input,
            Some(prev) => {
                let tc = if input > prev { self.attack } else { self.release };
                convex(prev, input, alpha_for(tc, dt))
            }
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> f32 {
        self.value.unwrap_or(0.0)
    }
}

/// One filter per tracked scalar.
#[derive(Debug, Clone)]
pub struct SmootherBank {
    bass: Ema,
    mid: Ema,
    treble: Ema,
    global: Ema,
    bands: [Ema; SUMMARY_BANDS],
    impact: Envelope,
}

impl SmootherBank {
    pub fn new(config: &SmoothingConfig) -> Self {
        Self {
            bass: Ema::new(config.bass),
            mid: Ema::new(config.mid),
            treble: Ema::new(config.treble),
            global: Ema::new(config.global),
            bands: std::array::from_fn(|_| Ema::new(config.bands)),
            impact: Envelope::new(config.impact_attack, config.impact_release),
        }
    }

    /// Feeds one raw frame observed `dt` seconds after the previous one.
    pub fn update(&mut self, raw: &RawEnergy, dt: f32) -> EnergyState {
        let global = self.global.update(raw.global, dt);
        EnergyState {
            bass: self.bass.update(raw.bass, dt),
            mid: self.mid.update(raw.mid, dt),
            treble: self.treble.update(raw.treble, dt),
            global,
            impact: self.impact.update(raw.global, dt),
            bands: std::array::from_fn(|i| self.bands[i].update(raw.bands[i], dt)),
        }
    }

    pub fn state(&self) -> EnergyState {
        EnergyState {
            bass: self.bass.value(),
            mid: self.mid.value(),
            treble: self.treble.value(),
            global: self.global.value(),
            impact: self.impact.value(),
            bands: std::array::from_fn(|i| self.bands[i].value()),
        }
    }
}
