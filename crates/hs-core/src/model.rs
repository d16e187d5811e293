//! Records kept by the housing support service.
//!
//! Properties house residents; support workers deliver sessions to residents
//! at a property. A [`Session`] references all three by ID and owns none of them.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::interval::TimeInterval;
use crate::types::{
    PropertyId, ResidentId, SessionId, SessionStatus, SupportType, ValidationError, WorkerId,
};

/// Shortest session that can be booked, in minutes.
pub const MIN_SESSION_MINUTES: u32 = 15;

/// Longest session that can be booked, in minutes.
pub const MAX_SESSION_MINUTES: u32 = 480;

/// A supported-housing property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub max_capacity: u32,
    pub is_active: bool,
}

impl Property {
    /// Creates an active property after validation.
    pub fn new(name: &str, max_capacity: u32) -> Result<Self, ValidationError> {
        let property = Self {
            id: PropertyId::generate(),
            name: name.trim().to_string(),
            max_capacity,
            is_active: true,
        };
        property.validate()?;
        Ok(property)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_name(&self.name, "property name")?;
        if self.max_capacity == 0 {
            return Err(ValidationError::NotPositive {
                field: "max capacity",
            });
        }
        Ok(())
    }
}

/// A person living at a property and receiving support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resident {
    pub id: ResidentId,
    pub name: String,
    /// Current property. Residents can be moved, so this is a reference only.
    pub property_id: PropertyId,
    /// Support hours allocated per month. Reported against, never enforced.
    pub monthly_support_hours: f64,
    pub is_active: bool,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl Resident {
    /// Creates an active resident after validation.
    pub fn new(
        name: &str,
        property_id: PropertyId,
        monthly_support_hours: f64,
        start_date: NaiveDate,
    ) -> Result<Self, ValidationError> {
        let resident = Self {
            id: ResidentId::generate(),
            name: name.trim().to_string(),
            property_id,
            monthly_support_hours,
            is_active: true,
            start_date,
            end_date: None,
        };
        resident.validate()?;
        Ok(resident)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_name(&self.name, "resident name")?;
        require_hours(self.monthly_support_hours, "monthly support hours")?;
        match self.end_date {
            Some(end) if end < self.start_date => Err(ValidationError::DateOrder {
                field: "residency",
                start: self.start_date.to_string(),
                end: end.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// A member of staff who delivers support sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportWorker {
    pub id: WorkerId,
    pub name: String,
    pub max_hours_per_week: f64,
    pub max_hours_per_month: f64,
    pub specializations: BTreeSet<SupportType>,
    pub is_active: bool,
}

impl SupportWorker {
    /// Creates an active worker after validation.
    pub fn new(
        name: &str,
        max_hours_per_week: f64,
        max_hours_per_month: f64,
        specializations: BTreeSet<SupportType>,
    ) -> Result<Self, ValidationError> {
        let worker = Self {
            id: WorkerId::generate(),
            name: name.trim().to_string(),
            max_hours_per_week,
            max_hours_per_month,
            specializations,
            is_active: true,
        };
        worker.validate()?;
        Ok(worker)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_name(&self.name, "worker name")?;
        require_hours(self.max_hours_per_week, "max hours per week")?;
        require_hours(self.max_hours_per_month, "max hours per month")
    }
}

/// A scheduled support session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub resident_id: ResidentId,
    pub support_worker_id: WorkerId,
    pub property_id: PropertyId,
    pub support_type: SupportType,
    pub session_date: NaiveDate,
    #[serde(flatten)]
    pub interval: TimeInterval,
    pub status: SessionStatus,
    pub notes: Option<String>,
    pub created_by: String,
}

impl Session {
    /// Length of the session, derived from its interval.
    pub const fn duration_minutes(&self) -> u32 {
        self.interval.duration_minutes()
    }

    /// Whether the session still occupies its worker's time.
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Wall-clock start of the session.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.session_date.and_time(self.interval.start_time())
    }
}

/// Unvalidated session fields, as submitted by a create or update request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInput {
    pub resident_id: String,
    pub support_worker_id: String,
    pub property_id: String,
    pub support_type: String,
    /// ISO 8601 date, e.g. `2024-03-01`.
    pub session_date: String,
    /// 24-hour `HH:MM`.
    pub start_time: String,
    /// 24-hour `HH:MM`.
    pub end_time: String,
    /// Optional; when present it must agree with the start and end times.
    pub duration_minutes: Option<u32>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// Session fields after validation, before an ID and author are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    pub resident_id: ResidentId,
    pub support_worker_id: WorkerId,
    pub property_id: PropertyId,
    pub support_type: SupportType,
    pub session_date: NaiveDate,
    pub interval: TimeInterval,
    pub status: SessionStatus,
    pub notes: Option<String>,
}

impl SessionInput {
    /// Validates every field, returning the first failure.
    pub fn validate(&self) -> Result<SessionDraft, ValidationError> {
        let resident_id = ResidentId::new(self.resident_id.trim())?;
        let support_worker_id = WorkerId::new(self.support_worker_id.trim())?;
        let property_id = PropertyId::new(self.property_id.trim())?;
        let support_type: SupportType = self.support_type.parse()?;
        let session_date = parse_date(&self.session_date, "session date")?;
        let interval = TimeInterval::parse(&self.start_time, &self.end_time)?;

        let actual = interval.duration_minutes();
        match self.duration_minutes {
            Some(declared) if declared != actual => {
                return Err(ValidationError::DurationMismatch { declared, actual });
            }
            _ => {}
        }
        if !(MIN_SESSION_MINUTES..=MAX_SESSION_MINUTES).contains(&actual) {
            return Err(ValidationError::DurationOutOfRange { minutes: actual });
        }

        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => SessionStatus::default(),
            Some(raw) => raw.parse()?,
        };
        let notes = self
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(ToString::to_string);

        Ok(SessionDraft {
            resident_id,
            support_worker_id,
            property_id,
            support_type,
            session_date,
            interval,
            status,
            notes,
        })
    }
}

impl SessionDraft {
    /// Attaches an identity to the draft.
    pub fn into_session(self, id: SessionId, created_by: &str) -> Session {
        Session {
            id,
            resident_id: self.resident_id,
            support_worker_id: self.support_worker_id,
            property_id: self.property_id,
            support_type: self.support_type,
            session_date: self.session_date,
            interval: self.interval,
            status: self.status,
            notes: self.notes,
            created_by: created_by.to_string(),
        }
    }
}

impl From<&Session> for SessionInput {
    fn from(session: &Session) -> Self {
        Self {
            resident_id: session.resident_id.to_string(),
            support_worker_id: session.support_worker_id.to_string(),
            property_id: session.property_id.to_string(),
            support_type: session.support_type.to_string(),
            session_date: session.session_date.to_string(),
            start_time: crate::interval::format_minutes(session.interval.start_minute()),
            end_time: crate::interval::format_minutes(session.interval.end_minute()),
            duration_minutes: Some(session.duration_minutes()),
            status: Some(session.status.to_string()),
            notes: session.notes.clone(),
        }
    }
}

/// Parses an ISO 8601 calendar date (`YYYY-MM-DD`).
pub fn parse_date(value: &str, field: &'static str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

fn require_name(name: &str, field: &'static str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(())
}

fn require_hours(value: f64, field: &'static str) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidHours { field, value });
    }
    Ok(())
}
