//! Trusted time source.
//!
//! `None` from [`Clock::now`] means no trusted time is available. Callers treat that as a
//! failed check, never as "now".

use chrono::{DateTime, Utc};
use std::sync::RwLock;

pub trait Clock: Send + Sync {
    fn now(&self) -> Option<DateTime<Utc>>;
}

/// Host wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        Some(Utc::now())
    }
}

/// A clock set by hand, for tests and replay tooling.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: RwLock<Option<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(Some(now)),
        }
    }

    /// A clock with no trusted reading.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Option<DateTime<Utc>>) {
        let mut guard = self.now.write().unwrap_or_else(|p| p.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.write().unwrap_or_else(|p| p.into_inner());
        if let Some(now) = guard.as_mut() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        *self.now.read().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_can_be_unset_and_advanced() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::at(start);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), Some(start + chrono::Duration::minutes(5)));

        clock.set(None);
        assert_eq!(clock.now(), None);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), None);
    }
}
