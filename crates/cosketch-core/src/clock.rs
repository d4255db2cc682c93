//! Monotonic high-resolution clock used for edit stamps, throttling and presence.

use std::cell::Cell;

// Use web-time on WASM, std::time otherwise
#[cfg(not(target_arch = "wasm32"))]
use std::time::{Instant, SystemTime, UNIX_EPOCH};
#[cfg(target_arch = "wasm32")]
use web_time::{Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds. Stamps from [`SystemClock`] count from the Unix epoch so
/// they compare across participants.
pub type Millis = f64;

/// Source of monotonic time in milliseconds.
pub trait Clock {
    /// Current time in milliseconds. Never decreases.
    fn now(&self) -> Millis;
}

/// Wall clock: the Unix time read once at construction, advanced by a
/// monotonic [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    epoch_offset: Millis,
}

impl SystemClock {
    pub fn new() -> Self {
        let epoch_offset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or_else(|e| {
                log::warn!("system time before Unix epoch: {}", e);
                0.0
            });
        Self {
            origin: Instant::now(),
            epoch_offset,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Millis {
        self.epoch_offset + self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Manually driven clock for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Millis>,
}

impl ManualClock {
    /// Create a clock starting at `start` milliseconds.
    pub fn new(start: Millis) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Move time forward by `delta` milliseconds (negative deltas are ignored).
    pub fn advance(&self, delta: Millis) {
        if delta > 0.0 {
            self.now.set(self.now.get() + delta);
        }
    }

    /// Jump to an absolute time, if it is not in the past.
    pub fn set(&self, at: Millis) {
        if at >= self.now.get() {
            self.now.set(at);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_system_clocks_share_epoch() {
        let first = SystemClock::new();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let second = SystemClock::new();
        // A clock created later does not restart from zero
        assert!(second.now() >= first.now() - 5.0);
        assert!(first.now() > 1_600_000_000_000.0);
    }

    #[test]
    fn test_manual_clock_never_goes_back() {
        let clock = ManualClock::new(100.0);
        clock.advance(50.0);
        assert_eq!(clock.now(), 150.0);
        clock.advance(-10.0);
        clock.set(20.0);
        assert_eq!(clock.now(), 150.0);
        clock.set(400.0);
        assert_eq!(clock.now(), 400.0);
    }
}
