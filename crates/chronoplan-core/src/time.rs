//! Clock-time and calendar-date values.
//!
//! [`Time`] is a time of day in whole minutes since midnight, limited to
//! 00:00..=24:00 so that the end of a day is representable. Arithmetic
//! saturates at both ends instead of wrapping into the next day.
//!
//! Calendar dates are plain [`chrono::NaiveDate`] values; [`DateExt`] adds the
//! day arithmetic the planner needs.
//! A missing time or date is always an `Option`.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Minutes in a day; also the largest valid [`Time`].
pub const MINUTES_PER_DAY: u32 = 1440;

/// Time of day with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u16);

impl Time {
    pub const MIDNIGHT: Time = Time(0);
    pub const END_OF_DAY: Time = Time(MINUTES_PER_DAY as u16);

    /// Build a time from hour and minute.
    ///
    /// # Errors
    /// Returns an error unless `hour < 24 && minute < 60`, or the time is
    /// exactly 24:00.
    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if (hour < 24 && minute < 60) || (hour == 24 && minute == 0) {
            Ok(Self((hour * 60 + minute) as u16))
        } else {
            Err(ValidationError::InvalidTime(format!("{hour:02}:{minute:02}")))
        }
    }

    /// Build a time from minutes since midnight, clamped to the day.
    pub fn from_minutes(minutes: i64) -> Self {
        Self(minutes.clamp(0, MINUTES_PER_DAY as i64) as u16)
    }

    pub fn minutes(self) -> u32 {
        self.0 as u32
    }

    pub fn hour(self) -> u32 {
        self.minutes() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes() % 60
    }

    pub fn plus_minutes(self, minutes: u32) -> Self {
        Self::from_minutes(self.0 as i64 + minutes as i64)
    }

    pub fn minus_minutes(self, minutes: u32) -> Self {
        Self::from_minutes(self.0 as i64 - minutes as i64)
    }

    /// Minutes from `self` forward to `later`, zero if `later` is earlier.
    pub fn minutes_until(self, later: Time) -> u32 {
        later.minutes().saturating_sub(self.minutes())
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for Time {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        Time::new(hour, minute).map_err(|_| invalid())
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Day arithmetic on calendar dates.
pub trait DateExt {
    /// Shift by a signed number of days, saturating at the calendar limits.
    fn plus_days(self, days: i64) -> NaiveDate;

    /// Signed number of days from `self` to `other`.
    fn days_until(self, other: NaiveDate) -> i64;
}

impl DateExt for NaiveDate {
    fn plus_days(self, days: i64) -> NaiveDate {
        self.checked_add_signed(Duration::days(days))
            .unwrap_or(if days >= 0 { NaiveDate::MAX } else { NaiveDate::MIN })
    }

    fn days_until(self, other: NaiveDate) -> i64 {
        (other - self).num_days()
    }
}
