//! Wall clock, timezone resolution, and business-day arithmetic.
//!
//! Every time-dependent decision in the service reads the injected
//! [`Clock`] and asks a [`BusinessCalendar`] whether a channel is inside
//! its working window. Instants are always compared as absolute UTC
//! values; the local zone only matters for deciding which wall-clock
//! hour and which calendar day an instant falls on.

pub mod business_hours;
pub mod holidays;

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

pub use business_hours::{parse_hhmm, resolve_timezone, BusinessCalendar};
pub use holidays::HolidayCalendar;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for deterministic tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `at`.
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// Jump to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
