//! Sampling cadence for live and video sessions.

use std::time::{Duration, Instant};

/// Live camera sampling interval.
pub const LIVE_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_VIDEO_FPS: u32 = 2;
pub const MIN_VIDEO_FPS: u32 = 1;
pub const MAX_VIDEO_FPS: u32 = 10;
/// No video cadence is faster than this, whatever the configured fps.
pub const MIN_VIDEO_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cadence {
    /// Checked once per rendered frame; fires on the first frame at least
    /// `interval` after the previous firing.
    FrameAligned { interval: Duration },
    /// Wall-clock timer. Missed periods are coalesced into one tick.
    FixedInterval { interval: Duration },
}

impl Cadence {
    pub fn live() -> Self {
        Cadence::FrameAligned {
            interval: LIVE_INTERVAL,
        }
    }

    /// Video cadence: `max(200ms, 1000ms / clamp(fps, 1, 10))`.
    pub fn video(fps: u32) -> Self {
        let fps = fps.clamp(MIN_VIDEO_FPS, MAX_VIDEO_FPS);
        let interval = (Duration::from_millis(1000) / fps).max(MIN_VIDEO_INTERVAL);
        Cadence::FixedInterval { interval }
    }

    pub fn interval(&self) -> Duration {
        match *self {
            Cadence::FrameAligned { interval } | Cadence::FixedInterval { interval } => interval,
        }
    }
}

/// A running cadence. Dropping it cancels all future ticks.
#[derive(Clone, Debug)]
pub struct CadenceTimer {
    cadence: Cadence,
    last_fired: Instant,
    next_due: Instant,
    coalesced: u64,
}

impl CadenceTimer {
    /// Start the cadence; the first tick is one interval after `now`.
    pub fn arm(cadence: Cadence, now: Instant) -> Self {
        Self {
            cadence,
            last_fired: now,
            next_due: now + cadence.interval(),
            coalesced: 0,
        }
    }

    /// Periods skipped because the caller polled late.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    /// Whether a tick fires at `now`. At most one tick per call.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.cadence {
            Cadence::FrameAligned { interval } => {
                if now.saturating_duration_since(self.last_fired) >= interval {
                    self.last_fired = now;
                    true
                } else {
                    false
                }
            }
            Cadence::FixedInterval { interval } => {
                if now < self.next_due {
                    return false;
                }
                self.last_fired = now;
                self.next_due += interval;
                while self.next_due <= now {
                    self.next_due += interval;
                    self.coalesced += 1;
                }
                true
            }
        }
    }
}
