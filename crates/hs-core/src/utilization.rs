//! Allocated versus delivered support hours.
//!
//! Only completed sessions count as used time. Remaining hours are allowed to
//! go negative (over-delivery is reported, not hidden), and every percentage
//! is defined as zero when its denominator is zero.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::model::{Property, Resident, Session, SupportWorker};
use crate::types::{SessionStatus, ValidationError};

/// Months per year over weeks per year, for pro-rating monthly allocations.
const WEEKS_PER_MONTH: f64 = 52.0 / 12.0;

/// Length of a reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    Month,
}

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub granularity: Granularity,
}

impl Period {
    /// First through last day of a calendar month.
    pub fn month(year: i32, month: u32) -> Result<Self, ValidationError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or(ValidationError::InvalidMonth { month })?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or(ValidationError::InvalidMonth { month })?;
        Ok(Self {
            start,
            end: next - Duration::days(1),
            granularity: Granularity::Month,
        })
    }

    /// The calendar month a date falls in.
    pub fn containing_month(date: NaiveDate) -> Option<Self> {
        Self::month(date.year(), date.month()).ok()
    }

    /// Seven days starting at `week_start`.
    pub fn week(week_start: NaiveDate) -> Self {
        Self {
            start: week_start,
            end: week_start + Duration::days(6),
            granularity: Granularity::Week,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Something with an hour allocation per period.
pub trait Allocated {
    /// Allocated hours for one period of the given length, if any.
    fn allocated_hours(&self, granularity: Granularity) -> Option<f64>;
}

impl Allocated for Resident {
    /// Residents are allocated monthly; weekly figures are pro-rated.
    fn allocated_hours(&self, granularity: Granularity) -> Option<f64> {
        match granularity {
            Granularity::Month => Some(self.monthly_support_hours),
            Granularity::Week => Some(self.monthly_support_hours / WEEKS_PER_MONTH),
        }
    }
}

impl Allocated for SupportWorker {
    fn allocated_hours(&self, granularity: Granularity) -> Option<f64> {
        match granularity {
            Granularity::Month => Some(self.max_hours_per_month),
            Granularity::Week => Some(self.max_hours_per_week),
        }
    }
}

/// Allocated, used and remaining hours for one entity over one period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UtilizationRecord {
    pub allocated_hours: f64,
    pub used_hours: f64,
    /// `allocated - used`; negative when more was delivered than allocated.
    pub remaining_hours: f64,
    /// Used over allocated, as a percentage with one decimal place.
    pub utilization_pct: f64,
}

/// Aggregates completed session time inside `period` against an allocation.
///
/// `sessions` should already be limited to the entity being measured.
pub fn aggregate(
    allocated: Option<f64>,
    sessions: &[Session],
    period: &Period,
) -> UtilizationRecord {
    let allocated_hours = allocated.filter(|h| h.is_finite()).unwrap_or(0.0);
    let used_hours = completed_hours(sessions, period);
    UtilizationRecord {
        allocated_hours,
        used_hours,
        remaining_hours: allocated_hours - used_hours,
        utilization_pct: percentage(used_hours, allocated_hours),
    }
}

/// Aggregates for an entity using its own allocation.
pub fn utilization<E: Allocated>(
    entity: &E,
    sessions: &[Session],
    period: &Period,
) -> UtilizationRecord {
    aggregate(entity.allocated_hours(period.granularity), sessions, period)
}

/// Hours of completed sessions dated inside `period`.
pub fn completed_hours(sessions: &[Session], period: &Period) -> f64 {
    let minutes: u32 = sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Completed && period.contains(s.session_date))
        .map(Session::duration_minutes)
        .sum();
    f64::from(minutes) / 60.0
}

/// Session counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounts {
    pub total: usize,
    pub planned: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub no_show: usize,
}

impl SessionCounts {
    /// Counts sessions dated inside `period`.
    pub fn tally(sessions: &[Session], period: &Period) -> Self {
        sessions
            .iter()
            .filter(|s| period.contains(s.session_date))
            .fold(Self::default(), |mut counts, s| {
                counts.add(s.status);
                counts
            })
    }

    /// Records one session.
    pub const fn add(&mut self, status: SessionStatus) {
        self.total += 1;
        match status {
            SessionStatus::Planned => self.planned += 1,
            SessionStatus::Completed => self.completed += 1,
            SessionStatus::Cancelled => self.cancelled += 1,
            SessionStatus::NoShow => self.no_show += 1,
        }
    }

    /// Completed over total, as a percentage.
    #[allow(clippy::cast_precision_loss)]
    pub fn completion_rate(&self) -> f64 {
        percentage(self.completed as f64, self.total as f64)
    }
}

/// Resident count against capacity for a property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OccupancyRecord {
    pub current_residents: usize,
    pub max_capacity: u32,
    pub occupancy_pct: f64,
}

/// Active residents currently assigned to `property`.
#[allow(clippy::cast_precision_loss)]
pub fn occupancy(property: &Property, residents: &[Resident]) -> OccupancyRecord {
    let current_residents = residents
        .iter()
        .filter(|r| r.is_active && r.property_id == property.id)
        .count();
    OccupancyRecord {
        current_residents,
        max_capacity: property.max_capacity,
        occupancy_pct: percentage(current_residents as f64, f64::from(property.max_capacity)),
    }
}

/// `numerator / denominator × 100`, rounded to one decimal place.
/// Zero when the denominator is zero, negative or not finite.
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    if !denominator.is_finite() || denominator <= 0.0 || !numerator.is_finite() {
        return 0.0;
    }
    round1(numerator / denominator * 100.0)
}

/// Rounds to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
