//! Audio output clocks
//!
//! The scheduler never reads wall time itself. It asks an [`AudioClock`] for
//! the current output time, which is what lets tests drive playback
//! deterministically with a [`ManualClock`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time in seconds on the audio output's timeline
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Seconds since the clock was created
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the engine.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        ManualClock {
            time: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, seconds: f64) {
        *self.time.lock() = seconds;
    }

    /// Move forward by `seconds` and return the new time
    pub fn advance(&self, seconds: f64) -> f64 {
        let mut time = self.time.lock();
        *time += seconds;
        *time
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        *self.time.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new(1.0);
        let engine_side = clock.clone();
        clock.advance(0.25);
        assert_eq!(engine_side.now(), 1.25);
        engine_side.set(3.0);
        assert_eq!(clock.now(), 3.0);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(a >= 0.0);
        assert!(b >= a);
    }
}
