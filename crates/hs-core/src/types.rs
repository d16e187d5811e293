//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field-level validation errors.
///
/// These are expected, recoverable errors: each variant names the offending
/// field or value so a caller can re-render its input form.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A time-of-day was not in 24-hour `HH:MM` form.
    #[error("{field} must be a 24-hour HH:MM time, got {value:?}")]
    InvalidTime { field: &'static str, value: String },

    /// A calendar date was not an ISO 8601 date.
    #[error("{field} must be an ISO 8601 date (YYYY-MM-DD), got {value:?}")]
    InvalidDate { field: &'static str, value: String },

    /// The session ends before it starts.
    #[error("end time {end} is before start time {start}; sessions cannot cross midnight")]
    CrossMidnight { start: String, end: String },

    /// The session starts and ends at the same time.
    #[error("start and end time are both {time}; a session must have a positive length")]
    EmptyInterval { time: String },

    /// Session length outside the accepted range.
    #[error("duration must be between 15 and 480 minutes, got {minutes}")]
    DurationOutOfRange { minutes: u32 },

    /// The declared duration disagrees with the start and end times.
    #[error("declared duration of {declared} minutes does not match start/end ({actual} minutes)")]
    DurationMismatch { declared: u32, actual: u32 },

    /// Unknown session status.
    #[error("invalid session status: {value}")]
    InvalidStatus { value: String },

    /// A count that must be strictly positive was zero.
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    /// An hour allocation was negative or not a finite number.
    #[error("{field} must be a non-negative number of hours, got {value}")]
    InvalidHours { field: &'static str, value: f64 },

    /// Month outside 1..=12.
    #[error("month must be between 1 and 12, got {month}")]
    InvalidMonth { month: u32 },

    /// A month whose calendar grid runs past the representable dates.
    #[error("{year}-{month:02} is outside the supported calendar range")]
    MonthOutOfRange { year: i32, month: u32 },

    /// A date range whose end precedes its start.
    #[error("{field} end date {end} is before start date {start}")]
    DateOrder {
        field: &'static str,
        start: String,
        end: String,
    },

    /// A referenced record exists but is no longer active.
    #[error("{field} {id} is inactive")]
    Inactive { field: &'static str, id: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated property identifier.
    PropertyId, "property ID"
);

define_string_id!(
    /// A validated resident identifier.
    ResidentId, "resident ID"
);

define_string_id!(
    /// A validated support worker identifier.
    WorkerId, "support worker ID"
);

define_string_id!(
    /// A validated support session identifier.
    ///
    /// Session IDs are unique within the store; new sessions get a UUID.
    SessionId, "session ID"
);

/// The kind of support delivered in a session.
///
/// The known kinds are fixed; anything else parses into [`SupportType::Custom`]
/// so new kinds can be recorded without a schema change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SupportType {
    PersonalCare,
    Medication,
    LifeSkills,
    EmotionalSupport,
    Budgeting,
    Housekeeping,
    HealthAppointment,
    CommunityAccess,
    SocialActivity,
    Custom(String),
}

impl SupportType {
    /// All built-in support types, in display order.
    pub const KNOWN: [Self; 9] = [
        Self::PersonalCare,
        Self::Medication,
        Self::LifeSkills,
        Self::EmotionalSupport,
        Self::Budgeting,
        Self::Housekeeping,
        Self::HealthAppointment,
        Self::CommunityAccess,
        Self::SocialActivity,
    ];

    /// String representation for storage and display.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PersonalCare => "personal_care",
            Self::Medication => "medication",
            Self::LifeSkills => "life_skills",
            Self::EmotionalSupport => "emotional_support",
            Self::Budgeting => "budgeting",
            Self::Housekeeping => "housekeeping",
            Self::HealthAppointment => "health_appointment",
            Self::CommunityAccess => "community_access",
            Self::SocialActivity => "social_activity",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for SupportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SupportType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty {
                field: "support type",
            });
        }
        let known = Self::KNOWN.into_iter().find(|kind| kind.as_str() == s);
        Ok(known.unwrap_or_else(|| Self::Custom(s.to_string())))
    }
}

impl Serialize for SupportType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SupportType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Lifecycle status of a support session.
///
/// Sessions usually move `planned → completed | cancelled | no_show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Planned,
    Completed,
    Cancelled,
    NoShow,
}

impl SessionStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// Whether a session in this status occupies the worker's time.
    ///
    /// Cancelled and no-show sessions never take part in conflict checks.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Planned | Self::Completed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "no_show" => Ok(Self::NoShow),
            _ => Err(ValidationError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }
}
