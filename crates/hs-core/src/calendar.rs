//! Calendar grids for displaying sessions.
//!
//! A [`CalendarView`] names what to show (a month, a week or a day); the
//! builder projects a list of sessions onto the matching grid. All three views
//! share [`bucket_by_date`], which keys sessions by their calendar date only.
//! Session dates carry no time zone, so bucketing never shifts a session to a
//! neighbouring day.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, Duration, NaiveDate};
use serde::Serialize;

use crate::interval::format_minutes;
use crate::model::Session;
use crate::types::ValidationError;

/// Number of week rows in a month grid.
pub const MONTH_GRID_WEEKS: usize = 6;
const MONTH_GRID_DAYS: i64 = 42;

/// First half-hour slot label in the week view, minutes since midnight.
const WEEK_SLOTS_START: u16 = 9 * 60;
/// Last half-hour slot label in the week view. No slot is emitted past it.
const WEEK_SLOTS_END: u16 = 18 * 60;
const WEEK_SLOT_MINUTES: u16 = 30;

/// First and last hour labels in the day view.
const DAY_HOURS_START: u16 = 8;
const DAY_HOURS_END: u16 = 19;

/// What a calendar shows, and the anchor it is built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum CalendarView {
    Monthly { year: i32, month: u32 },
    /// `week_start` is always a Sunday when built through [`CalendarView::weekly`].
    Weekly { week_start: NaiveDate },
    Daily { date: NaiveDate },
}

/// Anchors of the neighbouring views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub prev: CalendarView,
    pub next: CalendarView,
}

impl CalendarView {
    /// Month view. Rejects months outside 1–12 and months whose grid would
    /// run past the representable dates.
    pub fn monthly(year: i32, month: u32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::InvalidMonth { month });
        }
        let view = Self::Monthly { year, month };
        if view.checked_range().is_none() {
            return Err(ValidationError::MonthOutOfRange { year, month });
        }
        Ok(view)
    }

    /// Week view for the week (Sunday to Saturday) containing `anchor`.
    pub fn weekly(anchor: NaiveDate) -> Self {
        Self::Weekly {
            week_start: week_start(anchor),
        }
    }

    pub const fn daily(date: NaiveDate) -> Self {
        Self::Daily { date }
    }

    /// The view before this one, or this one at the earliest date.
    #[must_use]
    pub fn prev(&self) -> Self {
        let prev = match *self {
            Self::Monthly { year, month } => match month.clamp(1, 12) {
                1 => Self::Monthly {
                    year: year.saturating_sub(1),
                    month: 12,
                },
                month => Self::Monthly {
                    year,
                    month: month - 1,
                },
            },
            Self::Weekly { week_start } => Self::Weekly {
                week_start: shift(week_start, -7),
            },
            Self::Daily { date } => Self::Daily {
                date: shift(date, -1),
            },
        };
        self.step_to(prev)
    }

    /// The view after this one, or this one at the latest date.
    #[must_use]
    pub fn next(&self) -> Self {
        let next = match *self {
            Self::Monthly { year, month } => match month.clamp(1, 12) {
                12 => Self::Monthly {
                    year: year.saturating_add(1),
                    month: 1,
                },
                month => Self::Monthly {
                    year,
                    month: month + 1,
                },
            },
            Self::Weekly { week_start } => Self::Weekly {
                week_start: shift(week_start, 7),
            },
            Self::Daily { date } => Self::Daily {
                date: shift(date, 1),
            },
        };
        self.step_to(next)
    }

    /// `target` when its whole grid is representable and it moved at all.
    fn step_to(self, target: Self) -> Self {
        if target == self || target.checked_range().is_none() {
            self
        } else {
            target
        }
    }

    pub fn navigation(&self) -> Navigation {
        Navigation {
            prev: self.prev(),
            next: self.next(),
        }
    }

    /// Inclusive range of dates the grid displays.
    ///
    /// For a month this is the full six-week grid, including the leading and
    /// trailing days of neighbouring months.
    ///
    /// Views built past chrono's date bounds are clamped to them.
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        self.checked_range().unwrap_or_else(|| match *self {
            Self::Monthly { year, month } => {
                let start = month_grid_start(year, month);
                (start, shift(start, MONTH_GRID_DAYS - 1))
            }
            Self::Weekly { week_start } => (week_start, shift(week_start, 6)),
            Self::Daily { date } => (date, date),
        })
    }

    /// The displayed range, or `None` when any displayed day is not a
    /// representable date.
    fn checked_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let (start, days) = match *self {
            Self::Monthly { year, month } => {
                let first = NaiveDate::from_ymd_opt(year, month, 1)?;
                let offset = Days::new(u64::from(first.weekday().num_days_from_sunday()));
                (first.checked_sub_days(offset)?, MONTH_GRID_DAYS)
            }
            Self::Weekly { week_start } => (week_start, 7),
            Self::Daily { date } => (date, 1),
        };
        let end = start.checked_add_signed(Duration::days(days - 1))?;
        Some((start, end))
    }
}

/// One day in a month or week grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCell {
    pub date: NaiveDate,
    /// Whether the date lies in the month the view is anchored to.
    pub is_current_month: bool,
    pub is_today: bool,
    /// Sessions on this date, by start time.
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    /// Six rows of seven cells, Sunday first.
    pub weeks: Vec<Vec<DayCell>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekGrid {
    pub week_start: NaiveDate,
    /// Sunday through Saturday.
    pub days: Vec<DayCell>,
    /// Half-hour labels, `09:00` through `18:00`.
    pub time_slots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayGrid {
    pub date: NaiveDate,
    pub is_today: bool,
    /// Sessions on the date, by start time.
    pub sessions: Vec<Session>,
    /// Hourly labels, `08:00` through `19:00`.
    pub hours: Vec<String>,
}

/// A built calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum Grid {
    Month(MonthGrid),
    Week(WeekGrid),
    Day(DayGrid),
}

impl Grid {
    /// Every day cell in display order. The day view has none.
    pub fn cells(&self) -> Vec<&DayCell> {
        match self {
            Self::Month(grid) => grid.weeks.iter().flatten().collect(),
            Self::Week(grid) => grid.days.iter().collect(),
            Self::Day(_) => Vec::new(),
        }
    }

    /// Number of sessions placed on the grid.
    pub fn session_count(&self) -> usize {
        match self {
            Self::Day(grid) => grid.sessions.len(),
            _ => self.cells().iter().map(|c| c.sessions.len()).sum(),
        }
    }
}

/// Projects sessions onto the grid for `view`.
///
/// Sessions dated outside the view are ignored. `today` only sets the
/// `is_today` flags.
pub fn build_grid(view: &CalendarView, today: NaiveDate, sessions: &[Session]) -> Grid {
    let mut buckets = bucket_by_date(sessions);
    let grid = match *view {
        CalendarView::Monthly { year, month } => {
            Grid::Month(build_month(year, month.clamp(1, 12), today, &mut buckets))
        }
        CalendarView::Weekly { week_start } => {
            Grid::Week(build_week(week_start, today, &mut buckets))
        }
        CalendarView::Daily { date } => Grid::Day(DayGrid {
            date,
            is_today: date == today,
            sessions: buckets.remove(&date).unwrap_or_default(),
            hours: day_hour_labels(),
        }),
    };
    tracing::debug!(?view, sessions = grid.session_count(), "built calendar grid");
    grid
}

fn build_month(
    year: i32,
    month: u32,
    today: NaiveDate,
    buckets: &mut BTreeMap<NaiveDate, Vec<Session>>,
) -> MonthGrid {
    let start = month_grid_start(year, month);
    let weeks = (0..MONTH_GRID_WEEKS)
        .map(|week| {
            (0..7)
                .map(|weekday| {
                    let offset = i64::try_from(week * 7 + weekday).unwrap_or_default();
                    let date = shift(start, offset);
                    DayCell {
                        date,
                        is_current_month: date.year() == year && date.month() == month,
                        is_today: date == today,
                        sessions: buckets.remove(&date).unwrap_or_default(),
                    }
                })
                .collect()
        })
        .collect();
    MonthGrid { year, month, weeks }
}

fn build_week(
    week_start: NaiveDate,
    today: NaiveDate,
    buckets: &mut BTreeMap<NaiveDate, Vec<Session>>,
) -> WeekGrid {
    let days = (0..7)
        .map(|offset| {
            let date = shift(week_start, offset);
            DayCell {
                date,
                is_current_month: date.month() == week_start.month(),
                is_today: date == today,
                sessions: buckets.remove(&date).unwrap_or_default(),
            }
        })
        .collect();
    WeekGrid {
        week_start,
        days,
        time_slots: week_time_slots(),
    }
}

/// Groups sessions by date; each group is ordered by start time, then ID.
pub fn bucket_by_date(sessions: &[Session]) -> BTreeMap<NaiveDate, Vec<Session>> {
    let mut buckets: BTreeMap<NaiveDate, Vec<Session>> = BTreeMap::new();
    for session in sessions {
        buckets
            .entry(session.session_date)
            .or_default()
            .push(session.clone());
    }
    for bucket in buckets.values_mut() {
        bucket.sort_by(|a, b| {
            a.interval
                .start_minute()
                .cmp(&b.interval.start_minute())
                .then_with(|| a.id.cmp(&b.id))
        });
    }
    buckets
}

/// The Sunday on or before `date`.
///
/// Saturates at chrono's earliest date.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    shift(date, -i64::from(date.weekday().num_days_from_sunday()))
}

/// The Sunday on or before the first of the month.
///
/// Years chrono cannot represent pin to its nearest bound.
fn month_grid_start(year: i32, month: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month.clamp(1, 12), 1).unwrap_or(if year < 0 {
        NaiveDate::MIN
    } else {
        NaiveDate::MAX
    });
    week_start(first)
}

/// `date` moved by `days`, saturating at chrono's date bounds.
fn shift(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

/// Half-hour labels for the week view, `09:00` to `18:00` inclusive.
pub fn week_time_slots() -> Vec<String> {
    (WEEK_SLOTS_START..=WEEK_SLOTS_END)
        .step_by(usize::from(WEEK_SLOT_MINUTES))
        .map(format_minutes)
        .collect()
}

/// Hourly labels for the day view, `08:00` to `19:00` inclusive.
pub fn day_hour_labels() -> Vec<String> {
    (DAY_HOURS_START..=DAY_HOURS_END)
        .map(|hour| format_minutes(hour * 60))
        .collect()
}
