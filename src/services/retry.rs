//! Bounded polling: exponential backoff under a hard deadline.

use std::time::Duration;
use tokio::time::Instant;

/// Pacing for the compositor's wait loops.
///
/// Yields sleep intervals starting at `initial` and doubling up to `max`.
/// Once `deadline` has elapsed, `next_delay` returns None and the caller
/// surfaces a liveness error instead of waiting forever.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    started: Instant,
    deadline: Duration,
    current: Duration,
    max: Duration,
}

impl PollSchedule {
    pub fn new(deadline: Duration, initial: Duration, max: Duration) -> Self {
        Self {
            started: Instant::now(),
            deadline,
            current: initial,
            max,
        }
    }

    /// Time elapsed since the schedule started
    pub fn waited(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed milliseconds, for liveness error reporting
    pub fn waited_ms(&self) -> u64 {
        self.waited().as_millis() as u64
    }

    /// Next sleep interval, or None once the deadline has passed.
    ///
    /// The returned interval is clamped so a sleep never overshoots the
    /// deadline by more than one tick.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let elapsed = self.started.elapsed();
        if elapsed >= self.deadline {
            return None;
        }
        let delay = self.current.min(self.deadline - elapsed);
        self.current = (self.current * 2).min(self.max);
        Some(delay)
    }
}
