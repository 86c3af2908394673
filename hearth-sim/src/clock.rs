use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use jiff::Timestamp;

/// Source of wall-clock time for every time-dependent decision in the
/// pipeline (calibration expiry, alert cooldown, telemetry timestamps).
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.as_millisecond()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(by, Ordering::SeqCst);
    }

    pub fn set(&self, to: Timestamp) {
        self.millis.store(to.as_millisecond(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Timestamp::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millisecond(self.millis.load(Ordering::SeqCst))
            .unwrap_or(Timestamp::MAX)
    }
}

/// Milliseconds elapsed from `earlier` to `later`; negative if the clock went
/// backwards.
pub(crate) fn elapsed_millis(earlier: Timestamp, later: Timestamp) -> i64 {
    later.as_millisecond() - earlier.as_millisecond()
}

/// Whether strictly more than `period` has passed between the two instants.
pub(crate) fn has_elapsed(earlier: Timestamp, later: Timestamp, period: Duration) -> bool {
    let period = i64::try_from(period.as_millis()).unwrap_or(i64::MAX);
    elapsed_millis(earlier, later) > period
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_in_millis() {
        let clock = ManualClock::default();
        let start = clock.now();

        clock.advance(Duration::from_millis(1500));

        assert_eq!(elapsed_millis(start, clock.now()), 1500);
    }

    #[test]
    fn has_elapsed_is_strict() {
        let clock = ManualClock::default();
        let start = clock.now();
        let period = Duration::from_secs(300);

        clock.advance(period);
        assert!(!has_elapsed(start, clock.now(), period));

        clock.advance(Duration::from_millis(1));
        assert!(has_elapsed(start, clock.now(), period));
    }
}
