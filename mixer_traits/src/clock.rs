//! Time source for ack deadlines, wait steps and runner pacing.
//!
//! Everything that measures time in the mixer asks a [`Clock`] rather than
//! calling `Instant::now()` itself, so a whole recipe can be replayed in a
//! test without real sleeps.

use std::thread;
use std::time::{Duration, Instant};

/// Where actions read "now" and where the runner waits between ticks.
///
/// An action captures `now()` when its command goes out and compares later
/// readings against its deadline. The runner calls `sleep()` once per tick,
/// and the simulator uses the same clock to decide when a reply is due.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block for `d`. A simulated clock just moves its own time forward.
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, 0 if `epoch` lies in the future.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall time as the OS sees it. The CLI runs every recipe on this clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Clock that stands still until a test moves it.
    ///
    /// Clones share one offset. A test keeps a handle while the sequencer
    /// and the simulator hold others, and `advance` moves all of them.
    /// `sleep` advances instead of blocking, so the runner's tick loop
    /// drives time forward by itself.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Total simulated time since `new`.
        pub fn elapsed(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::ManualClock;
    use super::*;
    use std::sync::Arc;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.ms_since(t0), 0);
        clock.advance(Duration::from_millis(40));
        clock.sleep(Duration::from_millis(2));
        assert_eq!(clock.ms_since(t0), 42);
    }

    #[test]
    fn clones_share_time() {
        let a = ManualClock::new();
        let b = a.clone();
        a.advance(Duration::from_secs(1));
        assert_eq!(b.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn ms_since_saturates_for_future_epoch() {
        let clock = MonotonicClock::new();
        let future = clock.now() + Duration::from_secs(5);
        assert_eq!(clock.ms_since(future), 0);
    }

    #[test]
    fn sleeping_moves_the_deadline_reading_for_every_holder() {
        let clock = ManualClock::new();
        let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
        let sent_at = shared.now();
        for _ in 0..5 {
            shared.sleep(Duration::from_millis(10));
        }
        assert_eq!(clock.ms_since(sent_at), 50);
    }
}
