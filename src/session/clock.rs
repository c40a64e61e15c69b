use std::thread;
use std::time::{Duration, Instant};

/// Time source for the capture loop.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Holds the loop to one tick per `interval`.
///
/// Sleeps for whatever is left of the interval after the tick's work. A tick
/// that overruns gets no sleep and the next tick is not shortened to catch up,
/// so slow ticks lower the frame rate instead of bursting.
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    interval: Duration,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the time slept.
    pub fn pace(&self, clock: &dyn Clock, tick_start: Instant) -> Duration {
        let elapsed = clock.now().saturating_duration_since(tick_start);
        let remaining = self.interval.saturating_sub(elapsed);
        if !remaining.is_zero() {
            clock.sleep(remaining);
        }
        remaining
    }
}
