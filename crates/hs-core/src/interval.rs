//! Same-day time intervals.
//!
//! A [`TimeInterval`] is a half-open `[start, end)` range measured in minutes
//! since midnight. Intervals never cross midnight: construction rejects
//! `end < start` instead of wrapping.

use std::fmt;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// Minutes in a day; the largest representable end of an interval.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A half-open `[start, end)` interval within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "RawInterval")]
pub struct TimeInterval {
    start: u16,
    end: u16,
}

impl TimeInterval {
    /// Creates an interval from minutes since midnight.
    pub fn from_minutes(start: u16, end: u16) -> Result<Self, ValidationError> {
        if end > MINUTES_PER_DAY {
            return Err(ValidationError::InvalidTime {
                field: "end time",
                value: format_minutes(end),
            });
        }
        if end < start {
            return Err(ValidationError::CrossMidnight {
                start: format_minutes(start),
                end: format_minutes(end),
            });
        }
        if end == start {
            return Err(ValidationError::EmptyInterval {
                time: format_minutes(start),
            });
        }
        Ok(Self { start, end })
    }

    /// Creates an interval from two times of day.
    pub fn from_times(start: NaiveTime, end: NaiveTime) -> Result<Self, ValidationError> {
        Self::from_minutes(minutes_of_day(start), minutes_of_day(end))
    }

    /// Parses an interval from two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        let start = parse_minutes(start, "start time")?;
        let end = parse_minutes(end, "end time")?;
        Self::from_minutes(start, end)
    }

    /// Start, in minutes since midnight.
    pub const fn start_minute(self) -> u16 {
        self.start
    }

    /// End, in minutes since midnight.
    pub const fn end_minute(self) -> u16 {
        self.end
    }

    /// Length of the interval in minutes. Always positive.
    pub const fn duration_minutes(self) -> u32 {
        (self.end - self.start) as u32
    }

    /// Start as a time of day.
    pub fn start_time(self) -> NaiveTime {
        time_from_minutes(self.start)
    }

    /// End as a time of day. An interval ending at midnight reports `00:00`.
    pub fn end_time(self) -> NaiveTime {
        time_from_minutes(self.end)
    }

    /// Whether two intervals share any instant.
    ///
    /// Touching intervals (`a.end == b.start`) do not overlap.
    pub const fn overlaps(self, other: Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}–{}", format_minutes(self.start), format_minutes(self.end))
    }
}

/// Serialized form: `{"start": "09:00", "end": "10:00"}`.
#[derive(Serialize, Deserialize)]
struct RawInterval {
    start: String,
    end: String,
}

impl TryFrom<RawInterval> for TimeInterval {
    type Error = ValidationError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        Self::parse(&raw.start, &raw.end)
    }
}

impl From<TimeInterval> for RawInterval {
    fn from(interval: TimeInterval) -> Self {
        Self {
            start: format_minutes(interval.start),
            end: format_minutes(interval.end),
        }
    }
}

/// Parses `HH:MM` into minutes since midnight. `24:00` is accepted as end of day.
pub fn parse_minutes(value: &str, field: &'static str) -> Result<u16, ValidationError> {
    if value.trim() == "24:00" {
        return Ok(MINUTES_PER_DAY);
    }
    parse_time(value, field).map(minutes_of_day)
}

/// Parses a strict 24-hour `HH:MM` time of day.
pub fn parse_time(value: &str, field: &'static str) -> Result<NaiveTime, ValidationError> {
    let trimmed = value.trim();
    let invalid = || ValidationError::InvalidTime {
        field,
        value: value.to_string(),
    };
    if trimmed.len() != 5 {
        return Err(invalid());
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M").map_err(|_| invalid())
}

/// Minutes since midnight for a time of day, ignoring seconds.
#[allow(clippy::cast_possible_truncation)]
pub fn minutes_of_day(time: NaiveTime) -> u16 {
    // hour <= 23 and minute <= 59, so this fits in u16
    (time.hour() * 60 + time.minute()) as u16
}

fn time_from_minutes(minutes: u16) -> NaiveTime {
    let minutes = u32::from(minutes % MINUTES_PER_DAY);
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// Formats minutes since midnight as `HH:MM`.
pub fn format_minutes(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}
