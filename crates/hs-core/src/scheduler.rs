//! Session create/update/delete with conflict checking.
//!
//! Every write goes through the same steps: validate the input, make sure the
//! referenced resident, worker and property exist, read the worker's other
//! active sessions for the date (one repository read), check for overlap, and
//! persist. The store re-checks overlap atomically; if it reports one, the
//! caller sees the same [`ScheduleError::Conflict`] as for the fast-path check.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::conflict::{ConflictError, check_conflict};
use crate::filter::SessionFilter;
use crate::model::{Session, SessionDraft, SessionInput};
use crate::repository::{RepositoryError, Roster, SessionRepository};
use crate::types::{SessionId, SessionStatus, ValidationError};
use crate::utilization::Period;

/// Errors returned to callers of the scheduler.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Malformed or out-of-range input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The worker is already booked for part of the requested time.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The session can no longer be edited.
    #[error("session {id} is locked for edits since {locked_at}")]
    Locked {
        id: SessionId,
        locked_at: NaiveDateTime,
    },

    /// The store failed. Details are in the error source, not the message.
    #[error("storage failure")]
    Repository(#[source] RepositoryError),
}

impl ScheduleError {
    /// Maps a store error, logging failures that are not the caller's fault.
    fn from_store(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Overlap { conflicting_id } => Self::Conflict(ConflictError {
                conflicting_id,
                conflicting_interval: None,
            }),
            RepositoryError::NotFound { id } => Self::NotFound {
                kind: "session",
                id,
            },
            err @ RepositoryError::Backend(_) => {
                tracing::error!(error = ?err, "session store failure");
                Self::Repository(err)
            }
        }
    }
}

/// Rules applied on top of data validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Hours after a session's start when it stops accepting edits.
    /// `None` disables the lock.
    pub edit_lock_hours: Option<i64>,
}

/// Session scheduling service over a store.
#[derive(Debug)]
pub struct Scheduler<S> {
    store: S,
    policy: SchedulePolicy,
}

impl<S> Scheduler<S>
where
    S: SessionRepository + Roster,
{
    pub fn new(store: S) -> Self {
        Self::with_policy(store, SchedulePolicy::default())
    }

    pub const fn with_policy(store: S, policy: SchedulePolicy) -> Self {
        Self { store, policy }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Books a new session.
    pub fn create(
        &mut self,
        input: &SessionInput,
        created_by: &str,
    ) -> Result<Session, ScheduleError> {
        let draft = input.validate()?;
        self.check_references(&draft, None)?;

        let session = draft.into_session(SessionId::generate(), created_by);
        self.check_worker_free(&session)?;

        self.store
            .create(&session)
            .map_err(ScheduleError::from_store)?;
        tracing::info!(
            session = %session.id,
            worker = %session.support_worker_id,
            date = %session.session_date,
            interval = %session.interval,
            "session created"
        );
        self.warn_if_over_allocated(&session);
        Ok(session)
    }

    /// Replaces a session's fields, re-validating everything.
    pub fn update(
        &mut self,
        id: &SessionId,
        input: &SessionInput,
        now: NaiveDateTime,
    ) -> Result<Session, ScheduleError> {
        let existing = self.get(id)?;
        self.check_unlocked(&existing, now)?;

        let draft = input.validate()?;
        self.check_references(&draft, Some(&existing))?;

        let session = draft.into_session(id.clone(), &existing.created_by);
        self.check_worker_free(&session)?;

        self.store
            .update(id, &session)
            .map_err(ScheduleError::from_store)?;
        tracing::info!(session = %id, status = %session.status, "session updated");
        Ok(session)
    }

    /// Moves a session to a new status.
    ///
    /// Runs the full update path, so reviving a cancelled session is checked
    /// for conflicts like any other edit.
    pub fn set_status(
        &mut self,
        id: &SessionId,
        status: SessionStatus,
        now: NaiveDateTime,
    ) -> Result<Session, ScheduleError> {
        let existing = self.get(id)?;
        let mut input = SessionInput::from(&existing);
        input.status = Some(status.to_string());
        self.update(id, &input, now)
    }

    /// Removes a session.
    pub fn delete(&mut self, id: &SessionId, now: NaiveDateTime) -> Result<(), ScheduleError> {
        let existing = self.get(id)?;
        self.check_unlocked(&existing, now)?;
        self.store.delete(id).map_err(ScheduleError::from_store)?;
        tracing::info!(session = %id, "session deleted");
        Ok(())
    }

    /// Fetches a session by ID.
    pub fn get(&self, id: &SessionId) -> Result<Session, ScheduleError> {
        self.store
            .find_by_id(id)
            .map_err(ScheduleError::from_store)?
            .ok_or_else(|| ScheduleError::NotFound {
                kind: "session",
                id: id.to_string(),
            })
    }

    /// Sessions dated within `[start, end]` matching `filter`.
    pub fn sessions_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: &SessionFilter,
    ) -> Result<Vec<Session>, ScheduleError> {
        let sessions = self
            .store
            .find_by_date_range(start, end, filter)
            .map_err(ScheduleError::from_store)?;
        tracing::debug!(%start, %end, count = sessions.len(), "loaded sessions");
        Ok(sessions)
    }

    fn check_worker_free(&self, session: &Session) -> Result<(), ScheduleError> {
        let existing = self
            .store
            .find_active_by_worker_and_date(
                &session.support_worker_id,
                session.session_date,
                Some(&session.id),
            )
            .map_err(ScheduleError::from_store)?;
        check_conflict(session, &existing)?;
        Ok(())
    }

    fn check_unlocked(&self, session: &Session, now: NaiveDateTime) -> Result<(), ScheduleError> {
        let Some(hours) = self.policy.edit_lock_hours else {
            return Ok(());
        };
        // A lock too long to represent never arrives.
        let Some(locked_at) = Duration::try_hours(hours)
            .and_then(|lock| session.starts_at().checked_add_signed(lock))
        else {
            return Ok(());
        };
        if now >= locked_at {
            return Err(ScheduleError::Locked {
                id: session.id.clone(),
                locked_at,
            });
        }
        Ok(())
    }

    /// Verifies the draft's references exist. New references must also be
    /// active; ones carried over unchanged from `previous` may have been
    /// deactivated since.
    fn check_references(
        &self,
        draft: &SessionDraft,
        previous: Option<&Session>,
    ) -> Result<(), ScheduleError> {
        let store_err = ScheduleError::from_store;

        let resident = self
            .store
            .find_resident(&draft.resident_id)
            .map_err(store_err)?
            .ok_or_else(|| not_found("resident", draft.resident_id.as_str()))?;
        let carried = previous.is_some_and(|p| p.resident_id == draft.resident_id);
        if !resident.is_active && !carried {
            return Err(inactive("resident", draft.resident_id.as_str()));
        }

        let worker = self
            .store
            .find_worker(&draft.support_worker_id)
            .map_err(store_err)?
            .ok_or_else(|| not_found("support worker", draft.support_worker_id.as_str()))?;
        let carried = previous.is_some_and(|p| p.support_worker_id == draft.support_worker_id);
        if !worker.is_active && !carried {
            return Err(inactive("support worker", draft.support_worker_id.as_str()));
        }
        if !worker.specializations.is_empty()
            && !worker.specializations.contains(&draft.support_type)
        {
            tracing::debug!(
                worker = %worker.id,
                support_type = %draft.support_type,
                "support type outside worker specializations"
            );
        }

        let property = self
            .store
            .find_property(&draft.property_id)
            .map_err(store_err)?
            .ok_or_else(|| not_found("property", draft.property_id.as_str()))?;
        let carried = previous.is_some_and(|p| p.property_id == draft.property_id);
        if !property.is_active && !carried {
            return Err(inactive("property", draft.property_id.as_str()));
        }

        Ok(())
    }

    /// Logs when a resident's booked hours for the month exceed their
    /// allocation. Allocations are reported against, never enforced.
    ///
    /// The booking is already stored, so store failures here are logged
    /// rather than returned.
    fn warn_if_over_allocated(&self, session: &Session) {
        let resident = match self.store.find_resident(&session.resident_id) {
            Ok(Some(resident)) => resident,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    resident = %session.resident_id,
                    "allocation check failed"
                );
                return;
            }
        };
        let Some(period) = Period::containing_month(session.session_date) else {
            return;
        };
        let filter = SessionFilter::all().resident(resident.id.clone());
        let month = match self.store.find_by_date_range(period.start, period.end, &filter) {
            Ok(month) => month,
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    resident = %resident.id,
                    "allocation check failed"
                );
                return;
            }
        };
        let booked_minutes: u32 = month
            .iter()
            .filter(|s| s.is_active())
            .map(Session::duration_minutes)
            .sum();
        let booked_hours = f64::from(booked_minutes) / 60.0;
        if booked_hours > resident.monthly_support_hours {
            tracing::warn!(
                resident = %resident.id,
                booked_hours,
                allocated_hours = resident.monthly_support_hours,
                "resident booked beyond monthly allocation"
            );
        }
    }
}

fn not_found(kind: &'static str, id: &str) -> ScheduleError {
    ScheduleError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn inactive(field: &'static str, id: &str) -> ScheduleError {
    ScheduleError::Validation(ValidationError::Inactive {
        field,
        id: id.to_string(),
    })
}
