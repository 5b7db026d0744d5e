//! An injectable clock (spec.md §9 "the clock in particular must be
//! injectable to make idempotency and ordering tests deterministic").
//! Consumed by the fetch/submit orchestrators and the key-exchange state
//! machine instead of a direct `Utc::now()` call, so tests can pin time
//! and assert on exact ordering (e.g. `submittable`'s oldest-first rule).

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// A source of the current time. `SystemClock` is the production
/// implementation; `FixedClock` lets tests control `now()` precisely,
/// including advancing it between calls.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that returns a fixed instant, advanceable via [`FixedClock::advance`].
/// Stored as epoch millis in an `AtomicI64` so `now()` can take `&self`.
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        FixedClock { millis: AtomicI64::new(at.timestamp_millis()) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .expect("stored millis always came from a valid DateTime<Utc>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_holds_still_until_advanced() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(clock.now(), at + chrono::Duration::hours(1));
    }
}
