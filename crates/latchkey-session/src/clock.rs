//! Wall-clock source for session timestamps.
//!
//! Session timeouts are measured in wall-clock seconds, the same clock
//! that ends up in [`SessionSnapshot::update_time`]. The store asks its
//! [`Clock`] instead of calling `Utc::now()` directly so tests can move
//! time forward without sleeping.
//!
//! [`SessionSnapshot::update_time`]: latchkey_protocol::SessionSnapshot

use std::fmt;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of "now".
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Starts the clock at the given instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Starts the clock `secs` seconds after the Unix epoch.
    pub fn at_secs(secs: i64) -> Self {
        Self::new(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    /// Moves the clock forward (or backward, for negative values).
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        if let Some(next) = TimeDelta::try_seconds(secs).and_then(|d| now.checked_add_signed(d)) {
            *now = next;
        }
    }

    /// Jumps to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_by_seconds() {
        let clock = ManualClock::at_secs(1_000);

        clock.advance_secs(30);

        assert_eq!(clock.now().timestamp(), 1_030);
    }

    #[test]
    fn test_manual_clock_set_jumps() {
        let clock = ManualClock::at_secs(0);
        let target = Utc.timestamp_opt(5_000, 0).unwrap();

        clock.set(target);

        assert_eq!(clock.now(), target);
    }

    #[test]
    fn test_system_clock_is_close_to_utc_now() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }
}
