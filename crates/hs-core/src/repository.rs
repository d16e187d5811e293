//! Storage contracts for sessions and the records they reference.
//!
//! The engine never talks to a database directly. It reads and writes through
//! [`SessionRepository`] and [`Roster`]; `hs-db` implements both on SQLite and
//! [`MemoryStore`] implements them in process.
//!
//! # Overlap enforcement
//!
//! The scheduler checks for conflicts before writing, but a check followed by a
//! write is not atomic. Implementations must therefore refuse to store an
//! active session that overlaps another active session for the same worker
//! and date, reporting [`RepositoryError::Overlap`]. The scheduler turns that
//! into a conflict for the caller.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;

use crate::conflict::check_conflict;
use crate::filter::SessionFilter;
use crate::model::{Property, Resident, Session, SupportWorker};
use crate::types::{PropertyId, ResidentId, SessionId, WorkerId};

/// Errors reported by a store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The write would double-book a worker.
    #[error("session overlaps existing session {conflicting_id}")]
    Overlap { conflicting_id: SessionId },

    /// The record addressed by an update or delete does not exist.
    #[error("record not found: {id}")]
    NotFound { id: String },

    /// Any other failure of the underlying store.
    #[error("store failure")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RepositoryError {
    /// Wraps a backend-specific error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Result alias for store operations.
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Session persistence.
pub trait SessionRepository {
    /// Active (planned or completed) sessions for a worker on a date,
    /// optionally leaving out one session ID.
    fn find_active_by_worker_and_date(
        &self,
        worker_id: &WorkerId,
        date: NaiveDate,
        excluding: Option<&SessionId>,
    ) -> RepoResult<Vec<Session>>;

    /// Stores a new session and returns its ID.
    fn create(&mut self, session: &Session) -> RepoResult<SessionId>;

    /// Replaces the stored session with this ID.
    fn update(&mut self, id: &SessionId, session: &Session) -> RepoResult<()>;

    /// Removes a session.
    fn delete(&mut self, id: &SessionId) -> RepoResult<()>;

    fn find_by_id(&self, id: &SessionId) -> RepoResult<Option<Session>>;

    /// Sessions dated within `[start, end]` matching `filter`, ordered by
    /// date, start time and ID.
    fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: &SessionFilter,
    ) -> RepoResult<Vec<Session>>;
}

/// Lookups of the records a session references.
pub trait Roster {
    fn find_property(&self, id: &PropertyId) -> RepoResult<Option<Property>>;
    fn find_resident(&self, id: &ResidentId) -> RepoResult<Option<Resident>>;
    fn find_worker(&self, id: &WorkerId) -> RepoResult<Option<SupportWorker>>;

    /// All properties, ordered by name.
    fn list_properties(&self) -> RepoResult<Vec<Property>>;
    /// All residents, ordered by name.
    fn list_residents(&self) -> RepoResult<Vec<Resident>>;
    /// All support workers, ordered by name.
    fn list_workers(&self) -> RepoResult<Vec<SupportWorker>>;
}

/// An in-process store.
///
/// Writes take `&mut self`, so the overlap check and the write cannot
/// interleave with another writer.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    properties: BTreeMap<PropertyId, Property>,
    residents: BTreeMap<ResidentId, Resident>,
    workers: BTreeMap<WorkerId, SupportWorker>,
    sessions: BTreeMap<SessionId, Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_property(&mut self, property: Property) {
        self.properties.insert(property.id.clone(), property);
    }

    pub fn insert_resident(&mut self, resident: Resident) {
        self.residents.insert(resident.id.clone(), resident);
    }

    pub fn insert_worker(&mut self, worker: SupportWorker) {
        self.workers.insert(worker.id.clone(), worker);
    }

    /// Number of stored sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn guard_overlap(&self, session: &Session) -> RepoResult<()> {
        let same_day = self.find_active_by_worker_and_date(
            &session.support_worker_id,
            session.session_date,
            Some(&session.id),
        )?;
        check_conflict(session, &same_day).map_err(|err| RepositoryError::Overlap {
            conflicting_id: err.conflicting_id,
        })
    }
}

impl SessionRepository for MemoryStore {
    fn find_active_by_worker_and_date(
        &self,
        worker_id: &WorkerId,
        date: NaiveDate,
        excluding: Option<&SessionId>,
    ) -> RepoResult<Vec<Session>> {
        let mut found: Vec<Session> = self
            .sessions
            .values()
            .filter(|s| {
                s.is_active()
                    && &s.support_worker_id == worker_id
                    && s.session_date == date
                    && Some(&s.id) != excluding
            })
            .cloned()
            .collect();
        found.sort_by_key(|s| (s.interval.start_minute(), s.id.clone()));
        Ok(found)
    }

    fn create(&mut self, session: &Session) -> RepoResult<SessionId> {
        self.guard_overlap(session)?;
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(session.id.clone())
    }

    fn update(&mut self, id: &SessionId, session: &Session) -> RepoResult<()> {
        if !self.sessions.contains_key(id) {
            return Err(RepositoryError::NotFound { id: id.to_string() });
        }
        let mut stored = session.clone();
        stored.id = id.clone();
        self.guard_overlap(&stored)?;
        self.sessions.insert(id.clone(), stored);
        Ok(())
    }

    fn delete(&mut self, id: &SessionId) -> RepoResult<()> {
        self.sessions.remove(id);
        Ok(())
    }

    fn find_by_id(&self, id: &SessionId) -> RepoResult<Option<Session>> {
        Ok(self.sessions.get(id).cloned())
    }

    fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: &SessionFilter,
    ) -> RepoResult<Vec<Session>> {
        let predicate = filter.to_predicate().between_dates(start, end);
        let mut found: Vec<Session> = self
            .sessions
            .values()
            .filter(|s| predicate.matches(s))
            .cloned()
            .collect();
        found.sort_by_key(|s| (s.session_date, s.interval.start_minute(), s.id.clone()));
        Ok(found)
    }
}

impl Roster for MemoryStore {
    fn find_property(&self, id: &PropertyId) -> RepoResult<Option<Property>> {
        Ok(self.properties.get(id).cloned())
    }

    fn find_resident(&self, id: &ResidentId) -> RepoResult<Option<Resident>> {
        Ok(self.residents.get(id).cloned())
    }

    fn find_worker(&self, id: &WorkerId) -> RepoResult<Option<SupportWorker>> {
        Ok(self.workers.get(id).cloned())
    }

    fn list_properties(&self) -> RepoResult<Vec<Property>> {
        let mut all: Vec<Property> = self.properties.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn list_residents(&self) -> RepoResult<Vec<Resident>> {
        let mut all: Vec<Resident> = self.residents.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn list_workers(&self) -> RepoResult<Vec<SupportWorker>> {
        let mut all: Vec<SupportWorker> = self.workers.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::TimeInterval;
    use crate::types::{SessionStatus, SupportType};

    fn session(id: &str, start: &str, end: &str) -> Session {
        Session {
            id: SessionId::new(id).unwrap(),
            resident_id: ResidentId::new("res-1").unwrap(),
            support_worker_id: WorkerId::new("worker-1").unwrap(),
            property_id: PropertyId::new("prop-1").unwrap(),
            support_type: SupportType::Medication,
            session_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            interval: TimeInterval::parse(start, end).unwrap(),
            status: SessionStatus::Planned,
            notes: None,
            created_by: "admin".to_string(),
        }
    }

    #[test]
    fn store_refuses_overlapping_write() {
        let mut store = MemoryStore::new();
        store.create(&session("a", "09:00", "10:00")).unwrap();

        let err = store.create(&session("b", "09:30", "10:30")).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Overlap { ref conflicting_id } if conflicting_id.as_str() == "a"
        ));
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn update_excludes_itself_from_overlap() {
        let mut store = MemoryStore::new();
        store.create(&session("a", "09:00", "10:00")).unwrap();

        let moved = session("a", "09:30", "10:30");
        store.update(&moved.id, &moved).unwrap();
        let stored = store.find_by_id(&moved.id).unwrap().unwrap();
        assert_eq!(stored.interval, moved.interval);
    }

    #[test]
    fn update_of_missing_session_is_not_found() {
        let mut store = MemoryStore::new();
        let ghost = session("ghost", "09:00", "10:00");
        assert!(matches!(
            store.update(&ghost.id, &ghost),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn active_lookup_skips_cancelled_and_sorts() {
        let mut store = MemoryStore::new();
        store.create(&session("late", "13:00", "14:00")).unwrap();
        store.create(&session("early", "08:00", "09:00")).unwrap();
        let mut cancelled = session("cancelled", "10:00", "11:00");
        cancelled.status = SessionStatus::Cancelled;
        store.create(&cancelled).unwrap();

        let found = store
            .find_active_by_worker_and_date(
                &WorkerId::new("worker-1").unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                None,
            )
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }
}
