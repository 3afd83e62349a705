// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting, clocks and calendar-day keys.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, SecondsFormat, Utc};
use std::sync::{Arc, Mutex, PoisonError};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Source of wall-clock time.
///
/// Walk sessions and the XP ledger take a clock instead of calling
/// `Utc::now()` directly so that day rollover and pause accounting can be
/// driven deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Which calendar day a timestamp belongs to.
///
/// Day keys are computed in a single fixed offset for every dog so that a
/// device changing timezones cannot replay a day's caps.
#[derive(Debug, Clone, Copy)]
pub struct DayPolicy {
    offset: FixedOffset,
}

impl Default for DayPolicy {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayPolicy {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Build a policy from an offset in minutes east of UTC.
    ///
    /// Returns `None` when the offset is outside ±18 hours.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        if minutes.unsigned_abs() > 18 * 60 {
            return None;
        }
        FixedOffset::east_opt(minutes * 60).map(|offset| Self { offset })
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    /// Calendar date of `at` under this policy.
    pub fn date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// `YYYY-MM-DD` key of `at` under this policy.
    pub fn day_key(&self, at: DateTime<Utc>) -> String {
        format_day_key(self.date(at))
    }
}

/// Format a date as a zero-padded `YYYY-MM-DD` key.
pub fn format_day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a `YYYY-MM-DD` key.
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}
