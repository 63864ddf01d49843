//! Monotonic session clock.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// High-resolution monotonic time source shared by every producer of a session.
///
/// Timestamps are seconds since the clock origin. The wall-clock time of the
/// origin is kept so the log can be aligned with the video afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
    origin_wall: DateTime<Utc>,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_wall: Utc::now(),
        }
    }

    /// Seconds elapsed since the origin.
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Wall-clock time at which `now()` was zero.
    pub fn origin_wall(&self) -> DateTime<Utc> {
        self.origin_wall
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = Clock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(a >= 0.0);
        assert!(b >= a);
    }
}
