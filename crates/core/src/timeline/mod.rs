use std::time::{Duration, Instant};

/// Seconds since the active scene started. Advanced explicitly by the
/// engine; effects only ever see the value passed to them.
#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    pub time_seconds: f32,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    pub fn advance(&mut self, delta: f32) {
        self.time_seconds = (self.time_seconds + delta).max(0.0);
    }
}

/// Fixed-interval frame deadlines with no backlog.
///
/// When a frame overruns, the deadlines it missed are skipped rather than
/// queued, so the loop never tries to catch up with a burst of frames.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    next_deadline: Instant,
    skipped: u64,
}

impl FramePacer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_deadline: now,
            skipped: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total ticks dropped because a frame ran past them.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_deadline
    }

    pub fn time_until_next(&self, now: Instant) -> Duration {
        self.next_deadline.saturating_duration_since(now)
    }

    /// Marks the current tick done at `now` and schedules the next one.
    /// Returns how many ticks were skipped.
    pub fn complete(&mut self, now: Instant) -> u64 {
        let mut next = self.next_deadline + self.interval;
        let mut skipped = 0;
        while next <= now {
            next += self.interval;
            skipped += 1;
        }
        self.next_deadline = next;
        self.skipped += skipped;
        skipped
    }
}
