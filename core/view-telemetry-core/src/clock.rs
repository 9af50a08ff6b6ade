//! Time sources for the engine.
//!
//! Timers and dwell run on `monotonic()`; record timestamps come from `wall()`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send {
    /// Time elapsed since the clock's origin. Never goes backwards.
    fn monotonic(&self) -> Duration;

    fn wall(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualTime>>,
}

#[derive(Debug)]
struct ManualTime {
    elapsed: Duration,
    wall_origin: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(wall_origin: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualTime {
                elapsed: Duration::ZERO,
                wall_origin,
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut time) = self.inner.lock() {
            time.elapsed += by;
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Moves to `at` if it lies in the future; earlier instants are ignored.
    pub fn set(&self, at: Duration) {
        if let Ok(mut time) = self.inner.lock() {
            if at > time.elapsed {
                time.elapsed = at;
            }
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        self.inner
            .lock()
            .map(|time| time.elapsed)
            .unwrap_or_default()
    }

    fn wall(&self) -> DateTime<Utc> {
        match self.inner.lock() {
            Ok(time) => {
                let offset = ChronoDuration::from_std(time.elapsed)
                    .unwrap_or_else(|_| ChronoDuration::zero());
                time.wall_origin + offset
            }
            Err(_) => Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances_both_time_bases() {
        let origin = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        let clock = ManualClock::new(origin);
        clock.advance_ms(1500);
        assert_eq!(clock.monotonic(), Duration::from_millis(1500));
        assert_eq!(clock.wall(), origin + ChronoDuration::milliseconds(1500));
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let other = clock.clone();
        clock.advance_ms(10);
        assert_eq!(other.monotonic(), Duration::from_millis(10));
    }

    #[test]
    fn manual_clock_set_never_moves_backwards() {
        let clock = ManualClock::default();
        clock.set(Duration::from_millis(500));
        clock.set(Duration::from_millis(100));
        assert_eq!(clock.monotonic(), Duration::from_millis(500));
    }
}
