//! Fixed-interval gate for the periodic action cycle.

use embassy_time::{Duration, Instant};

/// Baseline and interval of the action cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollClock {
    pub last_action: Instant,
    pub interval: Duration,
}

/// Lets one action cycle through per elapsed interval.
///
/// The baseline moves to `now` whenever a cycle is let through, before
/// the cycle runs, so a failing cycle still waits a full interval
/// before the next one.
pub struct PollScheduler {
    clock: PollClock,
}

impl PollScheduler {
    /// The first cycle becomes due one interval after `start`.
    pub const fn new(interval: Duration, start: Instant) -> Self {
        Self {
            clock: PollClock {
                last_action: start,
                interval,
            },
        }
    }

    /// Returns `true` if an action cycle should run now, resetting the
    /// baseline to `now` when it does.
    pub fn tick(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.clock.last_action) < self.clock.interval {
            return false;
        }
        self.clock.last_action = now;
        true
    }
}
