use super::Ema;
use crate::config::IdleConfig;

/// What the idle blender needs to know about recent activity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActivitySignal {
    /// Smoothed loudness used to decide whether the room is quiet.
    pub activity: f32,
    /// Seconds spent continuously below the silence threshold.
    pub idle_seconds: f32,
}

/// Tracks how long the input has stayed quiet.
///
/// Activity is its own smoothed scalar, slower than the band filters, so a
/// single quiet frame between beats does not start the idle timer.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    activity: Ema,
    threshold: f32,
    silent_for: f32,
}

impl ActivityTracker {
    pub fn new(time_constant: f32, idle: &IdleConfig) -> Self {
        Self {
            activity: Ema::new(time_constant),
            threshold: idle.threshold,
            silent_for: 0.0,
        }
    }

    pub fn update(&mut self, loudness: f32, dt: f32) -> ActivitySignal {
        let activity = self.activity.update(loudness, dt);
        if activity < self.threshold {
            self.silent_for += dt.max(0.0);
        } else {
            self.silent_for = 0.0;
        }
        self.signal()
    }

    /// External activity (a keystroke, a scene switch) restarts the idle timer.
    pub fn note_activity(&mut self) {
        self.silent_for = 0.0;
    }

    pub fn signal(&self) -> ActivitySignal {
        ActivitySignal {
            activity: self.activity.value(),
            idle_seconds: self.silent_for,
        }
    }
}
