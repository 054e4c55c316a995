//! On-board UTC time keeping.
//!
//! Release times and housekeeping cadences are expressed as full UTC
//! timestamps rather than raw counters so that ground-provided absolute times
//! survive reboots without epoch bookkeeping. The timestamp is convertible to
//! Unix epoch seconds for modulo arithmetic and for the telemetry time field.
use core::fmt::{Display, Formatter};
use core::ops::{Add, AddAssign};
use core::time::Duration;

use chrono::{Datelike, Timelike, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SpacecraftError;

pub const UNIX_EPOCH_YEAR: u16 = 1970;
pub const SECONDS_PER_MINUTE: u64 = 60;
pub const SECONDS_PER_HOUR: u64 = 3600;
pub const SECONDS_PER_DAY: u64 = 86400;

const DAYS_OF_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Serialized size of a timestamp on the wire and in persisted records.
pub const UTC_TIMESTAMP_SIZE: usize = 7;

pub fn is_leap_year(year: u16) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// A calendar UTC timestamp with one-second resolution.
///
/// The derived ordering is lexicographic over the fields, which coincides
/// with chronological order. Seconds may reach 60 to absorb leap seconds.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UtcTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl UtcTimestamp {
    /// Sentinel returned by the release engine and the housekeeping tick when
    /// nothing is pending.
    pub const MAX: UtcTimestamp = UtcTimestamp {
        year: 9999,
        month: 12,
        day: 31,
        hour: 23,
        minute: 59,
        second: 59,
    };

    /// Build a validated timestamp. Rejects field values outside the calendar
    /// ranges with [SpacecraftError::InvalidDate]; seconds up to 60 are
    /// accepted for leap seconds.
    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<Self, SpacecraftError> {
        if year < UNIX_EPOCH_YEAR
            || !(1..=12).contains(&month)
            || !(1..=31).contains(&day)
            || hour >= 24
            || minute >= 60
            || second > 60
        {
            return Err(SpacecraftError::InvalidDate);
        }
        Ok(UtcTimestamp {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }

    fn days_in_month(year: u16, month: u8) -> u8 {
        let mut days = DAYS_OF_MONTH[(month - 1) as usize];
        if month == 2 && is_leap_year(year) {
            days += 1;
        }
        days
    }

    /// Seconds since the Unix epoch, via cumulative days with the leap-year
    /// rule.
    pub fn to_epoch_seconds(&self) -> u64 {
        let mut epoch_seconds = 0u64;
        for y in UNIX_EPOCH_YEAR..self.year {
            epoch_seconds += if is_leap_year(y) { 366 } else { 365 } * SECONDS_PER_DAY;
        }
        for m in 1..self.month {
            epoch_seconds += u64::from(Self::days_in_month(self.year, m)) * SECONDS_PER_DAY;
        }
        epoch_seconds += u64::from(self.day - 1) * SECONDS_PER_DAY;
        epoch_seconds += u64::from(self.hour) * SECONDS_PER_HOUR;
        epoch_seconds += u64::from(self.minute) * SECONDS_PER_MINUTE;
        epoch_seconds += u64::from(self.second);
        epoch_seconds
    }

    /// Inverse of [Self::to_epoch_seconds].
    pub fn from_epoch_seconds(mut seconds: u64) -> Self {
        let mut year = UNIX_EPOCH_YEAR;
        loop {
            let year_seconds = if is_leap_year(year) { 366 } else { 365 } * SECONDS_PER_DAY;
            if seconds < year_seconds {
                break;
            }
            seconds -= year_seconds;
            year += 1;
        }
        let mut month = 1u8;
        loop {
            let month_seconds = u64::from(Self::days_in_month(year, month)) * SECONDS_PER_DAY;
            if seconds < month_seconds {
                break;
            }
            seconds -= month_seconds;
            month += 1;
        }
        let day = (seconds / SECONDS_PER_DAY) as u8 + 1;
        seconds %= SECONDS_PER_DAY;
        let hour = (seconds / SECONDS_PER_HOUR) as u8;
        seconds %= SECONDS_PER_HOUR;
        let minute = (seconds / SECONDS_PER_MINUTE) as u8;
        let second = (seconds % SECONDS_PER_MINUTE) as u8;
        UtcTimestamp {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Shift by a signed number of seconds. Returns [None] if the result
    /// would fall before the Unix epoch.
    pub fn checked_shift(&self, offset_seconds: i64) -> Option<Self> {
        let epoch = self.to_epoch_seconds() as i64;
        let shifted = epoch.checked_add(offset_seconds)?;
        if shifted < 0 {
            return None;
        }
        Some(Self::from_epoch_seconds(shifted as u64))
    }
}

impl Add<Duration> for UtcTimestamp {
    type Output = UtcTimestamp;

    /// Adds a non-negative duration, propagating carries through
    /// second, minute, hour, day, month and year with correct month lengths.
    fn add(self, rhs: Duration) -> UtcTimestamp {
        let mut out = self;

        let total_seconds = u64::from(out.second) + rhs.as_secs();
        out.second = (total_seconds % SECONDS_PER_MINUTE) as u8;
        let total_minutes = u64::from(out.minute) + total_seconds / SECONDS_PER_MINUTE;
        out.minute = (total_minutes % 60) as u8;
        let total_hours = u64::from(out.hour) + total_minutes / 60;
        out.hour = (total_hours % 24) as u8;
        let mut carry_days = total_hours / 24;

        while carry_days > 0 {
            let month_days = u64::from(Self::days_in_month(out.year, out.month));
            if u64::from(out.day) + carry_days <= month_days {
                out.day += carry_days as u8;
                break;
            }
            carry_days -= month_days - u64::from(out.day) + 1;
            out.day = 1;
            if out.month == 12 {
                out.month = 1;
                out.year += 1;
            } else {
                out.month += 1;
            }
        }
        out
    }
}

impl AddAssign<Duration> for UtcTimestamp {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Display for UtcTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Source of the current UTC time.
pub trait Clock {
    fn now_utc(&self) -> UtcTimestamp;

    /// Current time as Unix epoch seconds, used for the telemetry secondary
    /// header time field.
    fn epoch_seconds(&self) -> u64 {
        self.now_utc().to_epoch_seconds()
    }
}

/// Wall-clock provider backed by the operating system clock.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> UtcTimestamp {
        let now = Utc::now();
        UtcTimestamp {
            year: now.year() as u16,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second().min(60) as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_of_epoch() {
        let ts = UtcTimestamp::new(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(ts.to_epoch_seconds(), 0);
    }

    #[test]
    fn test_known_epoch_value() {
        // 2000-03-01T00:00:00 UTC, one day after the leap day of 2000.
        let ts = UtcTimestamp::new(2000, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(ts.to_epoch_seconds(), 951868800);
    }

    #[test]
    fn test_epoch_round_trip() {
        for &secs in &[0u64, 1, 86399, 86400, 951868800, 4102444799] {
            let ts = UtcTimestamp::from_epoch_seconds(secs);
            assert_eq!(ts.to_epoch_seconds(), secs, "at {secs}");
        }
    }

    #[test]
    fn test_leap_year_rule() {
        assert!(is_leap_year(2000));
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(1900));
        assert!(!is_leap_year(2023));
    }

    #[test]
    fn test_validation() {
        assert!(UtcTimestamp::new(1969, 1, 1, 0, 0, 0).is_err());
        assert!(UtcTimestamp::new(2024, 13, 1, 0, 0, 0).is_err());
        assert!(UtcTimestamp::new(2024, 1, 0, 0, 0, 0).is_err());
        assert!(UtcTimestamp::new(2024, 1, 1, 24, 0, 0).is_err());
        // A leap second is allowed.
        assert!(UtcTimestamp::new(2016, 12, 31, 23, 59, 60).is_ok());
    }

    #[test]
    fn test_ordering_is_chronological() {
        let earlier = UtcTimestamp::new(2024, 2, 29, 23, 59, 59).unwrap();
        let later = UtcTimestamp::new(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(earlier < later);
        assert!(later < UtcTimestamp::MAX);
    }

    #[test]
    fn test_add_carries_through_month_end() {
        let ts = UtcTimestamp::new(2024, 2, 28, 23, 59, 30).unwrap();
        let shifted = ts + Duration::from_secs(31);
        // 2024 is a leap year, so the carry lands on February 29th.
        assert_eq!(shifted, UtcTimestamp::new(2024, 2, 29, 0, 0, 1).unwrap());

        let ts = UtcTimestamp::new(2023, 12, 31, 23, 59, 59).unwrap();
        let shifted = ts + Duration::from_secs(1);
        assert_eq!(shifted, UtcTimestamp::new(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_add_large_duration() {
        let ts = UtcTimestamp::new(2024, 1, 1, 0, 0, 0).unwrap();
        let shifted = ts + Duration::from_secs(366 * SECONDS_PER_DAY);
        assert_eq!(shifted, UtcTimestamp::new(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_checked_shift() {
        let ts = UtcTimestamp::new(2024, 1, 1, 0, 0, 10).unwrap();
        assert_eq!(
            ts.checked_shift(-10).unwrap(),
            UtcTimestamp::new(2024, 1, 1, 0, 0, 0).unwrap()
        );
        let epoch = UtcTimestamp::new(1970, 1, 1, 0, 0, 0).unwrap();
        assert!(epoch.checked_shift(-1).is_none());
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_serde_round_trip() {
        let ts = UtcTimestamp::new(2026, 8, 2, 12, 0, 0).unwrap();
        let raw = postcard::to_allocvec(&ts).unwrap();
        let back: UtcTimestamp = postcard::from_bytes(&raw).unwrap();
        assert_eq!(back, ts);
    }
}
