//! Sources of the current instant.
//!
//! Every time based decision the [`crate::Scheduler`] makes (readiness, lease expiry, renewal)
//! reads the time from a [`Clock`]. Production code uses [`SystemClock`]; tests drive a
//! [`ManualClock`] to make lease expiry deterministic without sleeping.
use std::sync::{Arc, RwLock};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock, at millisecond precision.
///
/// Stores persist timestamps in milliseconds, and a heartbeat renewal compares the stored
/// heartbeat for exact equality, so instants finer than that would never match after a round
/// trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// A clock which only moves when told to.
///
/// Clones share the same instant.
///
/// # Example
///
/// ```
/// # use delayq::clock::{Clock, ManualClock};
/// # use chrono::{TimeDelta, Utc};
/// let clock = ManualClock::new(Utc::now());
/// let start = clock.now();
///
/// clock.clone().advance(TimeDelta::seconds(5));
///
/// assert_eq!(clock.now() - start, TimeDelta::seconds(5));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(now.trunc_subsecs(3))),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|err| err.into_inner()) = now.trunc_subsecs(3);
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.write().unwrap_or_else(|err| err.into_inner());
        *now = (*now + delta).trunc_subsecs(3);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|err| err.into_inner())
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        self.as_ref().now()
    }
}

#[cfg(test)]
mod test {
    use chrono::Timelike;

    use super::*;

    #[test]
    fn system_clock_has_millisecond_precision() {
        let now = SystemClock.now();
        assert_eq!(now.nanosecond() % 1_000_000, 0);
    }

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::default();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(TimeDelta::milliseconds(1500));
        assert_eq!(clock.now(), start + TimeDelta::milliseconds(1500));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
