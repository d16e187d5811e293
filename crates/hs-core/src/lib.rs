//! Core domain logic for supported-housing session scheduling.
//!
//! This crate contains the types and logic for:
//! - Scheduling: validating sessions and refusing double-booked workers
//! - Calendars: projecting sessions onto month, week and day grids
//! - Utilization: allocated versus delivered hours per resident, worker and property
//! - Reports: monthly summaries and CSV export
//!
//! Storage sits behind the [`SessionRepository`] and [`Roster`] traits.

pub mod calendar;
mod conflict;
pub mod filter;
pub mod format;
mod interval;
mod model;
pub mod report;
pub mod repository;
mod scheduler;
mod types;
pub mod utilization;

pub use calendar::{CalendarView, DayCell, Grid, Navigation, build_grid};
pub use conflict::{ConflictError, check_conflict};
pub use filter::{Predicate, SessionFilter};
pub use interval::{MINUTES_PER_DAY, TimeInterval, format_minutes, minutes_of_day, parse_time};
pub use model::{
    MAX_SESSION_MINUTES, MIN_SESSION_MINUTES, Property, Resident, Session, SessionDraft,
    SessionInput, SupportWorker, parse_date,
};
pub use report::{MonthlySummary, ReportQuery, ResidentRow};
pub use repository::{MemoryStore, RepoResult, RepositoryError, Roster, SessionRepository};
pub use scheduler::{SchedulePolicy, ScheduleError, Scheduler};
pub use types::{
    PropertyId, ResidentId, SessionId, SessionStatus, SupportType, ValidationError, WorkerId,
};
pub use utilization::{Granularity, Period, UtilizationRecord};
