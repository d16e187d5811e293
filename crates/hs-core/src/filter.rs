//! Typed query predicates over sessions.
//!
//! A [`Predicate`] is a conjunction of `(field, operator, value)` constraints.
//! It can be evaluated in memory with [`Predicate::matches`] or rendered by a
//! storage backend into its own query language, so callers never assemble
//! query strings by hand.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::Session;
use crate::types::{PropertyId, ResidentId, SessionStatus, SupportType, WorkerId};

/// A filterable session attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    PropertyId,
    ResidentId,
    SupportWorkerId,
    SupportType,
    Status,
    SessionDate,
}

impl Field {
    /// Canonical snake_case name; also the storage column name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PropertyId => "property_id",
            Self::ResidentId => "resident_id",
            Self::SupportWorkerId => "support_worker_id",
            Self::SupportType => "support_type",
            Self::Status => "status",
            Self::SessionDate => "session_date",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison applied by a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    /// SQL spelling of the operator.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    fn compare<T: Ord + ?Sized>(self, left: &T, right: &T) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Gt => left > right,
            Self::Gte => left >= right,
        }
    }
}

/// A constraint operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Date(NaiveDate),
}

impl Value {
    /// The value in its storage form. Dates render as ISO 8601, which sorts
    /// the same way as the dates themselves.
    pub fn to_storage_string(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Date(date) => date.format("%Y-%m-%d").to_string(),
        }
    }
}

/// One `(field, operator, value)` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub field: Field,
    pub op: Operator,
    pub value: Value,
}

/// A conjunction of constraints. The empty predicate matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    constraints: Vec<Constraint>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint.
    #[must_use]
    pub fn and(mut self, field: Field, op: Operator, value: Value) -> Self {
        self.constraints.push(Constraint { field, op, value });
        self
    }

    /// Adds an equality constraint when `value` is present.
    #[must_use]
    pub fn and_eq_opt(self, field: Field, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.and(field, Operator::Eq, Value::Text(value.to_string())),
            None => self,
        }
    }

    /// Restricts `session_date` to the inclusive range `[start, end]`.
    #[must_use]
    pub fn between_dates(self, start: NaiveDate, end: NaiveDate) -> Self {
        self.and(Field::SessionDate, Operator::Gte, Value::Date(start))
            .and(Field::SessionDate, Operator::Lte, Value::Date(end))
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Evaluates the predicate against a session.
    pub fn matches(&self, session: &Session) -> bool {
        self.constraints.iter().all(|c| constraint_matches(c, session))
    }
}

fn constraint_matches(constraint: &Constraint, session: &Session) -> bool {
    let op = constraint.op;
    match (&constraint.value, constraint.field) {
        (Value::Date(date), Field::SessionDate) => op.compare(&session.session_date, date),
        (Value::Text(text), Field::SessionDate) => {
            op.compare(session.session_date.format("%Y-%m-%d").to_string().as_str(), text)
        }
        (Value::Text(text), field) => op.compare(text_field(session, field), text.as_str()),
        (Value::Date(date), field) => {
            let text = date.format("%Y-%m-%d").to_string();
            op.compare(text_field(session, field), text.as_str())
        }
    }
}

fn text_field(session: &Session, field: Field) -> &str {
    match field {
        Field::PropertyId => session.property_id.as_str(),
        Field::ResidentId => session.resident_id.as_str(),
        Field::SupportWorkerId => session.support_worker_id.as_str(),
        Field::SupportType => session.support_type.as_str(),
        Field::Status => session.status.as_str(),
        Field::SessionDate => "",
    }
}

/// Optional equality filters for session range queries, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    pub property_id: Option<PropertyId>,
    pub resident_id: Option<ResidentId>,
    pub support_worker_id: Option<WorkerId>,
    pub support_type: Option<SupportType>,
    pub status: Option<SessionStatus>,
}

impl SessionFilter {
    /// A filter that matches every session.
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn property(mut self, id: PropertyId) -> Self {
        self.property_id = Some(id);
        self
    }

    #[must_use]
    pub fn resident(mut self, id: ResidentId) -> Self {
        self.resident_id = Some(id);
        self
    }

    #[must_use]
    pub fn worker(mut self, id: WorkerId) -> Self {
        self.support_worker_id = Some(id);
        self
    }

    #[must_use]
    pub fn support_type(mut self, kind: SupportType) -> Self {
        self.support_type = Some(kind);
        self
    }

    #[must_use]
    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Converts the filter into a predicate.
    pub fn to_predicate(&self) -> Predicate {
        Predicate::new()
            .and_eq_opt(Field::PropertyId, self.property_id.as_ref())
            .and_eq_opt(Field::ResidentId, self.resident_id.as_ref())
            .and_eq_opt(Field::SupportWorkerId, self.support_worker_id.as_ref())
            .and_eq_opt(Field::SupportType, self.support_type.as_ref())
            .and_eq_opt(Field::Status, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::TimeInterval;
    use crate::types::SessionId;

    fn session(property: &str, status: SessionStatus, day: u32) -> Session {
        Session {
            id: SessionId::generate(),
            resident_id: ResidentId::new("res-1").unwrap(),
            support_worker_id: WorkerId::new("worker-1").unwrap(),
            property_id: PropertyId::new(property).unwrap(),
            support_type: SupportType::Budgeting,
            session_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            interval: TimeInterval::parse("09:00", "10:00").unwrap(),
            status,
            notes: None,
            created_by: "admin".to_string(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let predicate = SessionFilter::all().to_predicate();
        assert!(predicate.is_empty());
        assert!(predicate.matches(&session("elm", SessionStatus::Cancelled, 1)));
    }

    #[test]
    fn filters_combine_with_and() {
        let predicate = SessionFilter::all()
            .property(PropertyId::new("elm").unwrap())
            .status(SessionStatus::Completed)
            .to_predicate();
        assert_eq!(predicate.constraints().len(), 2);

        assert!(predicate.matches(&session("elm", SessionStatus::Completed, 1)));
        assert!(!predicate.matches(&session("oak", SessionStatus::Completed, 1)));
        assert!(!predicate.matches(&session("elm", SessionStatus::Planned, 1)));
    }

    #[test]
    fn date_bounds_are_inclusive() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let predicate = Predicate::new().between_dates(start, end);

        assert!(!predicate.matches(&session("elm", SessionStatus::Planned, 4)));
        assert!(predicate.matches(&session("elm", SessionStatus::Planned, 5)));
        assert!(predicate.matches(&session("elm", SessionStatus::Planned, 10)));
        assert!(!predicate.matches(&session("elm", SessionStatus::Planned, 11)));
    }

    #[test]
    fn support_type_filter_uses_storage_name() {
        let predicate = SessionFilter::all()
            .support_type(SupportType::Budgeting)
            .to_predicate();
        assert_eq!(
            predicate.constraints()[0].value,
            Value::Text("budgeting".to_string())
        );
    }
}
