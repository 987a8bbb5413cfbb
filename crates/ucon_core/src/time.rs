//! Time sources and policy date parsing.
//!
//! Expiration is evaluated lazily on access, so every component that needs
//! "now" receives a [`Clock`] instead of reading the wall clock directly.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use std::sync::{Mutex, PoisonError};

/// A source of the current time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock frozen at `now`
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to an instant
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move forward
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse a date as written in policy documents.
///
/// Accepts RFC 3339 date-times, naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC)
/// and bare `YYYY-MM-DD`, which means the last second of that day.
///
/// # Errors
///
/// Returns error if the value matches none of the accepted forms
pub fn parse_policy_datetime(value: &str) -> CoreResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(end_of_day) = date.and_hms_opt(23, 59, 59) {
            return Ok(end_of_day.and_utc());
        }
    }
    Err(CoreError::InvalidTimestamp {
        reason: format!("unrecognized date {:?}", value),
    })
}
