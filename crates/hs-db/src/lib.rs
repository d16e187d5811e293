//! Storage layer for housing support scheduling.
//!
//! Provides persistence for properties, residents, support workers and
//! sessions using `rusqlite`, and implements the [`SessionRepository`] and
//! [`Roster`] contracts from `hs-core`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Use one `Database` per thread, or wrap it in a `Mutex`. Separate connections
//! to the same file are safe: the overlap guard below runs inside SQLite.
//!
//! # Schema
//!
//! ## Date and Time Format
//!
//! Dates are stored as TEXT `YYYY-MM-DD` and times of day as TEXT `HH:MM`
//! (`24:00` marks end of day). Both are zero-padded, so comparing the text
//! orders values the same way as comparing the dates and times.
//!
//! ## Overlap Guard
//!
//! Triggers on `sessions` abort any insert or update that would leave two
//! active (`planned` or `completed`) sessions for the same worker and date
//! with overlapping times. The check and the write happen in one statement
//! under SQLite's write lock, so concurrent writers cannot both succeed.
//! Writes also run in `BEGIN IMMEDIATE` transactions so the conflicting
//! session can be looked up before the lock is released.
//!
//! ## Worker Specializations
//!
//! Stored as a JSON array of support type names in `support_workers.specializations`.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::Path;

use chrono::NaiveDate;
use hs_core::filter::Predicate;
use hs_core::{
    Property, PropertyId, RepoResult, RepositoryError, Resident, ResidentId, Roster, Session,
    SessionFilter, SessionId, SessionRepository, SessionStatus, SupportType, SupportWorker,
    TimeInterval, WorkerId, format_minutes, parse_date,
};
use rusqlite::{
    Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params, params_from_iter,
};
use thiserror::Error;

/// Message raised by the overlap triggers.
const OVERLAP_MESSAGE: &str = "session_overlap";

const SESSION_COLUMNS: &str = "id, resident_id, support_worker_id, property_id, support_type, \
     session_date, start_time, end_time, status, notes, created_by";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored row does not describe a valid record.
    #[error("invalid {table} row {id}: {message}")]
    InvalidRow {
        table: &'static str,
        id: String,
        message: String,
    },
    /// Failed to encode or decode a worker's specializations.
    #[error("invalid specializations for worker {worker_id}")]
    Specializations {
        worker_id: String,
        #[source]
        source: serde_json::Error,
    },
    /// The write would double-book a worker.
    #[error("session overlaps existing session {conflicting_id}")]
    Overlap { conflicting_id: SessionId },
    /// The addressed row does not exist.
    #[error("{table} not found: {id}")]
    NotFound { table: &'static str, id: String },
}

impl From<DbError> for RepositoryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Overlap { conflicting_id } => Self::Overlap { conflicting_id },
            DbError::NotFound { id, .. } => Self::NotFound { id },
            other => Self::backend(other),
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS properties (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                max_capacity INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS residents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                property_id TEXT NOT NULL,
                monthly_support_hours REAL NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                start_date TEXT NOT NULL,
                end_date TEXT,
                FOREIGN KEY (property_id) REFERENCES properties(id)
            );

            CREATE INDEX IF NOT EXISTS idx_residents_property ON residents(property_id);

            -- specializations: JSON array of support type names
            CREATE TABLE IF NOT EXISTS support_workers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                max_hours_per_week REAL NOT NULL DEFAULT 0,
                max_hours_per_month REAL NOT NULL DEFAULT 0,
                specializations TEXT NOT NULL DEFAULT '[]',
                is_active INTEGER NOT NULL DEFAULT 1
            );

            -- session_date: 'YYYY-MM-DD'
            -- start_time/end_time: 'HH:MM', end_time may be '24:00'
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                resident_id TEXT NOT NULL,
                support_worker_id TEXT NOT NULL,
                property_id TEXT NOT NULL,
                support_type TEXT NOT NULL,
                session_date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'planned',
                notes TEXT,
                created_by TEXT NOT NULL,
                CHECK (start_time < end_time),
                FOREIGN KEY (resident_id) REFERENCES residents(id),
                FOREIGN KEY (support_worker_id) REFERENCES support_workers(id),
                FOREIGN KEY (property_id) REFERENCES properties(id)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_worker_date
                ON sessions(support_worker_id, session_date);
            CREATE INDEX IF NOT EXISTS idx_sessions_date ON sessions(session_date);
            CREATE INDEX IF NOT EXISTS idx_sessions_resident ON sessions(resident_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_property ON sessions(property_id);

            CREATE TRIGGER IF NOT EXISTS sessions_no_overlap_insert
            BEFORE INSERT ON sessions
            WHEN NEW.status IN ('planned', 'completed')
            BEGIN
                SELECT RAISE(ABORT, 'session_overlap')
                WHERE EXISTS (
                    SELECT 1 FROM sessions
                    WHERE support_worker_id = NEW.support_worker_id
                      AND session_date = NEW.session_date
                      AND status IN ('planned', 'completed')
                      AND start_time < NEW.end_time
                      AND NEW.start_time < end_time
                );
            END;

            CREATE TRIGGER IF NOT EXISTS sessions_no_overlap_update
            BEFORE UPDATE ON sessions
            WHEN NEW.status IN ('planned', 'completed')
            BEGIN
                SELECT RAISE(ABORT, 'session_overlap')
                WHERE EXISTS (
                    SELECT 1 FROM sessions
                    WHERE id <> OLD.id
                      AND support_worker_id = NEW.support_worker_id
                      AND session_date = NEW.session_date
                      AND status IN ('planned', 'completed')
                      AND start_time < NEW.end_time
                      AND NEW.start_time < end_time
                );
            END;
            ",
        )?;
        Ok(())
    }

    // ========== Properties ==========

    pub fn insert_property(&mut self, property: &Property) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO properties (id, name, max_capacity, is_active) VALUES (?, ?, ?, ?)",
            params![
                property.id.as_str(),
                property.name,
                property.max_capacity,
                property.is_active
            ],
        )?;
        tracing::debug!(property = %property.id, "inserted property");
        Ok(())
    }

    pub fn update_property(&mut self, property: &Property) -> Result<(), DbError> {
        let changed = self.conn.execute(
            "UPDATE properties SET name = ?, max_capacity = ?, is_active = ? WHERE id = ?",
            params![
                property.name,
                property.max_capacity,
                property.is_active,
                property.id.as_str()
            ],
        )?;
        require_changed(changed, "property", property.id.as_str())
    }

    // ========== Residents ==========

    pub fn insert_resident(&mut self, resident: &Resident) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO residents
                (id, name, property_id, monthly_support_hours, is_active, start_date, end_date)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                resident.id.as_str(),
                resident.name,
                resident.property_id.as_str(),
                resident.monthly_support_hours,
                resident.is_active,
                format_date(resident.start_date),
                resident.end_date.map(format_date),
            ],
        )?;
        tracing::debug!(resident = %resident.id, "inserted resident");
        Ok(())
    }

    pub fn update_resident(&mut self, resident: &Resident) -> Result<(), DbError> {
        let changed = self.conn.execute(
            "
            UPDATE residents
            SET name = ?, property_id = ?, monthly_support_hours = ?, is_active = ?,
                start_date = ?, end_date = ?
            WHERE id = ?
            ",
            params![
                resident.name,
                resident.property_id.as_str(),
                resident.monthly_support_hours,
                resident.is_active,
                format_date(resident.start_date),
                resident.end_date.map(format_date),
                resident.id.as_str(),
            ],
        )?;
        require_changed(changed, "resident", resident.id.as_str())
    }

    // ========== Support Workers ==========

    pub fn insert_worker(&mut self, worker: &SupportWorker) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO support_workers
                (id, name, max_hours_per_week, max_hours_per_month, specializations, is_active)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
            params![
                worker.id.as_str(),
                worker.name,
                worker.max_hours_per_week,
                worker.max_hours_per_month,
                encode_specializations(worker)?,
                worker.is_active,
            ],
        )?;
        tracing::debug!(worker = %worker.id, "inserted support worker");
        Ok(())
    }

    pub fn update_worker(&mut self, worker: &SupportWorker) -> Result<(), DbError> {
        let changed = self.conn.execute(
            "
            UPDATE support_workers
            SET name = ?, max_hours_per_week = ?, max_hours_per_month = ?,
                specializations = ?, is_active = ?
            WHERE id = ?
            ",
            params![
                worker.name,
                worker.max_hours_per_week,
                worker.max_hours_per_month,
                encode_specializations(worker)?,
                worker.is_active,
                worker.id.as_str(),
            ],
        )?;
        require_changed(changed, "support worker", worker.id.as_str())
    }

    // ========== Sessions ==========

    fn insert_session(&mut self, session: &Session) -> Result<SessionId, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = tx.execute(
            &format!(
                "INSERT INTO sessions ({SESSION_COLUMNS}, duration_minutes)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                session.id.as_str(),
                session.resident_id.as_str(),
                session.support_worker_id.as_str(),
                session.property_id.as_str(),
                session.support_type.as_str(),
                format_date(session.session_date),
                format_minutes(session.interval.start_minute()),
                format_minutes(session.interval.end_minute()),
                session.status.as_str(),
                session.notes,
                session.created_by,
                session.duration_minutes(),
            ],
        );
        if let Err(err) = result {
            return Err(overlap_or(&tx, session, err));
        }
        tx.commit()?;
        Ok(session.id.clone())
    }

    fn update_session(&mut self, id: &SessionId, session: &Session) -> Result<(), DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = tx.execute(
            "
            UPDATE sessions
            SET resident_id = ?, support_worker_id = ?, property_id = ?, support_type = ?,
                session_date = ?, start_time = ?, end_time = ?, duration_minutes = ?,
                status = ?, notes = ?
            WHERE id = ?
            ",
            params![
                session.resident_id.as_str(),
                session.support_worker_id.as_str(),
                session.property_id.as_str(),
                session.support_type.as_str(),
                format_date(session.session_date),
                format_minutes(session.interval.start_minute()),
                format_minutes(session.interval.end_minute()),
                session.duration_minutes(),
                session.status.as_str(),
                session.notes,
                id.as_str(),
            ],
        );
        let changed = match result {
            Ok(changed) => changed,
            Err(err) => {
                let mut stored = session.clone();
                stored.id = id.clone();
                return Err(overlap_or(&tx, &stored, err));
            }
        };
        require_changed(changed, "session", id.as_str())?;
        tx.commit()?;
        Ok(())
    }

    fn delete_session(&mut self, id: &SessionId) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM sessions WHERE id = ?", [id.as_str()])?;
        Ok(())
    }

    fn query_sessions(&self, predicate: &Predicate) -> Result<Vec<Session>, DbError> {
        let (clause, values) = where_clause(predicate);
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {SESSION_COLUMNS}
            FROM sessions
            {clause}
            ORDER BY session_date ASC, start_time ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), SessionRow::from_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }

    fn active_sessions_for(
        &self,
        worker_id: &WorkerId,
        date: NaiveDate,
        excluding: Option<&SessionId>,
    ) -> Result<Vec<Session>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE support_worker_id = ?
              AND session_date = ?
              AND status IN ('planned', 'completed')
              AND id <> ?
            ORDER BY start_time ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![
                worker_id.as_str(),
                format_date(date),
                excluding.map_or("", SessionId::as_str)
            ],
            SessionRow::from_row,
        )?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }

    fn session_by_id(&self, id: &SessionId) -> Result<Option<Session>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"),
                [id.as_str()],
                SessionRow::from_row,
            )
            .optional()?;
        row.map(SessionRow::into_session).transpose()
    }

    // ========== Roster Queries ==========

    fn property_rows(&self, id: Option<&PropertyId>) -> Result<Vec<Property>, DbError> {
        let (clause, value) = id_clause(id.map(PropertyId::as_str));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, name, max_capacity, is_active FROM properties {clause} \
             ORDER BY name ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params_from_iter(value.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;
        let mut properties = Vec::new();
        for row in rows {
            let (id, name, max_capacity, is_active) = row?;
            properties.push(Property {
                id: PropertyId::new(id.clone()).map_err(|e| invalid("properties", &id, e))?,
                name,
                max_capacity,
                is_active,
            });
        }
        Ok(properties)
    }

    fn resident_rows(&self, id: Option<&ResidentId>) -> Result<Vec<Resident>, DbError> {
        let (clause, value) = id_clause(id.map(ResidentId::as_str));
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT id, name, property_id, monthly_support_hours, is_active, start_date, end_date
            FROM residents
            {clause}
            ORDER BY name ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(params_from_iter(value.iter()), |row| {
            Ok(ResidentRow {
                id: row.get(0)?,
                name: row.get(1)?,
                property_id: row.get(2)?,
                monthly_support_hours: row.get(3)?,
                is_active: row.get(4)?,
                start_date: row.get(5)?,
                end_date: row.get(6)?,
            })
        })?;
        let mut residents = Vec::new();
        for row in rows {
            residents.push(row?.into_resident()?);
        }
        Ok(residents)
    }

    fn worker_rows(&self, id: Option<&WorkerId>) -> Result<Vec<SupportWorker>, DbError> {
        let (clause, value) = id_clause(id.map(WorkerId::as_str));
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT id, name, max_hours_per_week, max_hours_per_month, specializations, is_active
            FROM support_workers
            {clause}
            ORDER BY name ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(params_from_iter(value.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;
        let mut workers = Vec::new();
        for row in rows {
            let (id, name, max_hours_per_week, max_hours_per_month, specializations, is_active) =
                row?;
            let specializations: BTreeSet<SupportType> = serde_json::from_str(&specializations)
                .map_err(|source| DbError::Specializations {
                    worker_id: id.clone(),
                    source,
                })?;
            workers.push(SupportWorker {
                id: WorkerId::new(id.clone()).map_err(|e| invalid("support_workers", &id, e))?,
                name,
                max_hours_per_week,
                max_hours_per_month,
                specializations,
                is_active,
            });
        }
        Ok(workers)
    }
}

impl SessionRepository for Database {
    fn find_active_by_worker_and_date(
        &self,
        worker_id: &WorkerId,
        date: NaiveDate,
        excluding: Option<&SessionId>,
    ) -> RepoResult<Vec<Session>> {
        Ok(self.active_sessions_for(worker_id, date, excluding)?)
    }

    fn create(&mut self, session: &Session) -> RepoResult<SessionId> {
        Ok(self.insert_session(session)?)
    }

    fn update(&mut self, id: &SessionId, session: &Session) -> RepoResult<()> {
        Ok(self.update_session(id, session)?)
    }

    fn delete(&mut self, id: &SessionId) -> RepoResult<()> {
        Ok(self.delete_session(id)?)
    }

    fn find_by_id(&self, id: &SessionId) -> RepoResult<Option<Session>> {
        Ok(self.session_by_id(id)?)
    }

    fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: &SessionFilter,
    ) -> RepoResult<Vec<Session>> {
        let predicate = filter.to_predicate().between_dates(start, end);
        Ok(self.query_sessions(&predicate)?)
    }
}

impl Roster for Database {
    fn find_property(&self, id: &PropertyId) -> RepoResult<Option<Property>> {
        Ok(self.property_rows(Some(id))?.into_iter().next())
    }

    fn find_resident(&self, id: &ResidentId) -> RepoResult<Option<Resident>> {
        Ok(self.resident_rows(Some(id))?.into_iter().next())
    }

    fn find_worker(&self, id: &WorkerId) -> RepoResult<Option<SupportWorker>> {
        Ok(self.worker_rows(Some(id))?.into_iter().next())
    }

    fn list_properties(&self) -> RepoResult<Vec<Property>> {
        Ok(self.property_rows(None)?)
    }

    fn list_residents(&self) -> RepoResult<Vec<Resident>> {
        Ok(self.resident_rows(None)?)
    }

    fn list_workers(&self) -> RepoResult<Vec<SupportWorker>> {
        Ok(self.worker_rows(None)?)
    }
}

/// A session as stored, before its fields are checked.
struct SessionRow {
    id: String,
    resident_id: String,
    support_worker_id: String,
    property_id: String,
    support_type: String,
    session_date: String,
    start_time: String,
    end_time: String,
    status: String,
    notes: Option<String>,
    created_by: String,
}

impl SessionRow {
    /// Reads the columns listed in `SESSION_COLUMNS`, in order.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            resident_id: row.get(1)?,
            support_worker_id: row.get(2)?,
            property_id: row.get(3)?,
            support_type: row.get(4)?,
            session_date: row.get(5)?,
            start_time: row.get(6)?,
            end_time: row.get(7)?,
            status: row.get(8)?,
            notes: row.get(9)?,
            created_by: row.get(10)?,
        })
    }

    fn into_session(self) -> Result<Session, DbError> {
        let bad = |err: hs_core::ValidationError| invalid("sessions", &self.id, err);
        Ok(Session {
            id: SessionId::new(self.id.clone()).map_err(bad)?,
            resident_id: ResidentId::new(self.resident_id.clone()).map_err(bad)?,
            support_worker_id: WorkerId::new(self.support_worker_id.clone()).map_err(bad)?,
            property_id: PropertyId::new(self.property_id.clone()).map_err(bad)?,
            support_type: self.support_type.parse::<SupportType>().map_err(bad)?,
            session_date: parse_date(&self.session_date, "session date").map_err(bad)?,
            interval: TimeInterval::parse(&self.start_time, &self.end_time).map_err(bad)?,
            status: self.status.parse::<SessionStatus>().map_err(bad)?,
            notes: self.notes.clone(),
            created_by: self.created_by.clone(),
        })
    }
}

struct ResidentRow {
    id: String,
    name: String,
    property_id: String,
    monthly_support_hours: f64,
    is_active: bool,
    start_date: String,
    end_date: Option<String>,
}

impl ResidentRow {
    fn into_resident(self) -> Result<Resident, DbError> {
        let bad = |err: hs_core::ValidationError| invalid("residents", &self.id, err);
        Ok(Resident {
            id: ResidentId::new(self.id.clone()).map_err(bad)?,
            property_id: PropertyId::new(self.property_id.clone()).map_err(bad)?,
            start_date: parse_date(&self.start_date, "start date").map_err(bad)?,
            end_date: self
                .end_date
                .as_deref()
                .map(|d| parse_date(d, "end date"))
                .transpose()
                .map_err(bad)?,
            monthly_support_hours: self.monthly_support_hours,
            is_active: self.is_active,
            name: self.name.clone(),
        })
    }
}

/// Maps a failed session write to [`DbError::Overlap`] when the overlap
/// trigger fired, looking up the conflicting session in the still-open
/// transaction.
fn overlap_or(tx: &Transaction<'_>, session: &Session, err: rusqlite::Error) -> DbError {
    let is_overlap = matches!(
        &err,
        rusqlite::Error::SqliteFailure(_, Some(message)) if message == OVERLAP_MESSAGE
    );
    if !is_overlap {
        return err.into();
    }
    let conflicting = tx
        .query_row(
            "
            SELECT id FROM sessions
            WHERE support_worker_id = ?
              AND session_date = ?
              AND status IN ('planned', 'completed')
              AND start_time < ?
              AND ? < end_time
              AND id <> ?
            ORDER BY start_time ASC, id ASC
            LIMIT 1
            ",
            params![
                session.support_worker_id.as_str(),
                format_date(session.session_date),
                format_minutes(session.interval.end_minute()),
                format_minutes(session.interval.start_minute()),
                session.id.as_str(),
            ],
            |row| row.get::<_, String>(0),
        )
        .optional();
    match conflicting {
        Ok(Some(id)) => match SessionId::new(id.clone()) {
            Ok(conflicting_id) => {
                tracing::debug!(
                    session = %session.id,
                    conflicting = %conflicting_id,
                    "overlap guard fired"
                );
                DbError::Overlap { conflicting_id }
            }
            Err(e) => invalid("sessions", &id, e),
        },
        Ok(None) => err.into(),
        Err(lookup) => lookup.into(),
    }
}

/// Renders a predicate as a `WHERE` clause with positional parameters.
fn where_clause(predicate: &Predicate) -> (String, Vec<String>) {
    if predicate.is_empty() {
        return (String::new(), Vec::new());
    }
    let mut conditions = Vec::with_capacity(predicate.constraints().len());
    let mut values = Vec::with_capacity(predicate.constraints().len());
    for constraint in predicate.constraints() {
        conditions.push(format!(
            "{} {} ?",
            constraint.field.as_str(),
            constraint.op.as_sql()
        ));
        values.push(constraint.value.to_storage_string());
    }
    (format!("WHERE {}", conditions.join(" AND ")), values)
}

fn id_clause(id: Option<&str>) -> (&'static str, Vec<String>) {
    match id {
        Some(id) => ("WHERE id = ?", vec![id.to_string()]),
        None => ("", Vec::new()),
    }
}

fn require_changed(changed: usize, table: &'static str, id: &str) -> Result<(), DbError> {
    if changed == 0 {
        return Err(DbError::NotFound {
            table,
            id: id.to_string(),
        });
    }
    Ok(())
}

fn encode_specializations(worker: &SupportWorker) -> Result<String, DbError> {
    serde_json::to_string(&worker.specializations).map_err(|source| DbError::Specializations {
        worker_id: worker.id.to_string(),
        source,
    })
}

fn invalid(table: &'static str, id: &str, err: impl Display) -> DbError {
    DbError::InvalidRow {
        table,
        id: id.to_string(),
        message: err.to_string(),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_core::{Scheduler, SessionInput, ScheduleError};

    struct Seeded {
        db: Database,
        property: Property,
        resident: Resident,
        worker: SupportWorker,
    }

    fn seeded() -> Seeded {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let (property, resident, worker) = roster();
        db.insert_property(&property).unwrap();
        db.insert_resident(&resident).unwrap();
        db.insert_worker(&worker).unwrap();
        Seeded {
            db,
            property,
            resident,
            worker,
        }
    }

    fn roster() -> (Property, Resident, SupportWorker) {
        let property = Property::new("Elm House", 4).unwrap();
        let resident = Resident::new(
            "Alex",
            property.id.clone(),
            10.0,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .unwrap();
        let specializations = BTreeSet::from([
            SupportType::Medication,
            SupportType::Custom("gardening".to_string()),
        ]);
        let worker = SupportWorker::new("Sam", 37.5, 150.0, specializations).unwrap();
        (property, resident, worker)
    }

    fn session(s: &Seeded, id: &str, day: u32, start: &str, end: &str) -> Session {
        session_for(&s.resident, &s.worker, id, day, (start, end))
    }

    fn session_for(
        resident: &Resident,
        worker: &SupportWorker,
        id: &str,
        day: u32,
        (start, end): (&str, &str),
    ) -> Session {
        Session {
            id: SessionId::new(id).unwrap(),
            resident_id: resident.id.clone(),
            support_worker_id: worker.id.clone(),
            property_id: resident.property_id.clone(),
            support_type: SupportType::Medication,
            session_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            interval: TimeInterval::parse(start, end).unwrap(),
            status: SessionStatus::Planned,
            notes: Some("bring blister pack".to_string()),
            created_by: "admin".to_string(),
        }
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");
        assert_eq!(
            table_columns(&db.conn, "sessions"),
            vec![
                "id",
                "resident_id",
                "support_worker_id",
                "property_id",
                "support_type",
                "session_date",
                "start_time",
                "end_time",
                "duration_minutes",
                "status",
                "notes",
                "created_by",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "properties"),
            vec!["id", "name", "max_capacity", "is_active"]
        );
    }

    #[test]
    fn session_round_trips() {
        let mut s = seeded();
        let stored = session(&s, "s1", 1, "09:00", "10:30");
        s.db.create(&stored).unwrap();

        let loaded = s.db.find_by_id(&stored.id).unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert!(s.db.find_by_id(&SessionId::new("nope").unwrap()).unwrap().is_none());
    }

    #[test]
    fn end_of_day_session_is_stored() {
        let mut s = seeded();
        let late = session(&s, "late", 1, "23:00", "24:00");
        s.db.create(&late).unwrap();
        let loaded = s.db.find_by_id(&late.id).unwrap().unwrap();
        assert_eq!(loaded.duration_minutes(), 60);
    }

    #[test]
    fn trigger_rejects_overlapping_insert() {
        let mut s = seeded();
        s.db.create(&session(&s, "first", 1, "09:00", "10:00")).unwrap();

        let err = s
            .db
            .create(&session(&s, "second", 1, "09:30", "10:30"))
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Overlap { ref conflicting_id } if conflicting_id.as_str() == "first"
        ));
        assert!(s.db.find_by_id(&SessionId::new("second").unwrap()).unwrap().is_none());

        s.db.create(&session(&s, "adjacent", 1, "10:00", "11:00")).unwrap();
        s.db.create(&session(&s, "next-day", 2, "09:30", "10:30")).unwrap();
    }

    #[test]
    fn trigger_ignores_inactive_sessions() {
        let mut s = seeded();
        let mut cancelled = session(&s, "cancelled", 1, "09:00", "10:00");
        cancelled.status = SessionStatus::Cancelled;
        s.db.create(&cancelled).unwrap();
        s.db.create(&session(&s, "rebooked", 1, "09:00", "10:00")).unwrap();

        let mut revived = cancelled.clone();
        revived.status = SessionStatus::Planned;
        let err = s.db.update(&revived.id, &revived).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Overlap { ref conflicting_id } if conflicting_id.as_str() == "rebooked"
        ));
    }

    #[test]
    fn update_excludes_own_row() {
        let mut s = seeded();
        let original = session(&s, "s1", 1, "09:00", "10:00");
        s.db.create(&original).unwrap();

        let mut moved = original.clone();
        moved.interval = TimeInterval::parse("09:30", "10:30").unwrap();
        s.db.update(&moved.id, &moved).unwrap();
        assert_eq!(s.db.find_by_id(&moved.id).unwrap().unwrap().interval, moved.interval);
    }

    #[test]
    fn update_and_delete_of_missing_session() {
        let mut s = seeded();
        let ghost = session(&s, "ghost", 1, "09:00", "10:00");
        assert!(matches!(
            s.db.update(&ghost.id, &ghost),
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(s.db.delete(&ghost.id).is_ok());
    }

    #[test]
    fn date_range_query_applies_filter_and_order() {
        let mut s = seeded();
        s.db.create(&session(&s, "b", 5, "13:00", "14:00")).unwrap();
        s.db.create(&session(&s, "a", 5, "09:00", "10:00")).unwrap();
        s.db.create(&session(&s, "c", 1, "09:00", "10:00")).unwrap();
        let mut done = session(&s, "d", 10, "09:00", "10:00");
        done.status = SessionStatus::Completed;
        s.db.create(&done).unwrap();
        s.db.create(&session(&s, "e", 20, "09:00", "10:00")).unwrap();

        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let all = s.db.find_by_date_range(start, end, &SessionFilter::all()).unwrap();
        let ids: Vec<&str> = all.iter().map(|x| x.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);

        let completed = s
            .db
            .find_by_date_range(
                start,
                end,
                &SessionFilter::all()
                    .property(s.property.id.clone())
                    .status(SessionStatus::Completed),
            )
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id.as_str(), "d");
    }

    #[test]
    fn roster_round_trips_and_sorts() {
        let mut s = seeded();
        let zed = Property::new("Zed Lodge", 2).unwrap();
        s.db.insert_property(&zed).unwrap();

        let names: Vec<String> = s
            .db
            .list_properties()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Elm House", "Zed Lodge"]);

        let worker = s.db.find_worker(&s.worker.id).unwrap().unwrap();
        assert_eq!(worker, s.worker);
        let resident = s.db.find_resident(&s.resident.id).unwrap().unwrap();
        assert_eq!(resident, s.resident);

        let mut moved = s.resident.clone();
        moved.property_id = zed.id.clone();
        moved.is_active = false;
        s.db.update_resident(&moved).unwrap();
        assert_eq!(s.db.find_resident(&moved.id).unwrap().unwrap(), moved);

        let mut missing = zed;
        missing.id = PropertyId::new("missing").unwrap();
        assert!(matches!(
            s.db.update_property(&missing),
            Err(DbError::NotFound { table: "property", .. })
        ));
    }

    #[test]
    fn scheduler_over_database_reports_conflict() {
        let s = seeded();
        let input = |start: &str, end: &str| SessionInput {
            resident_id: s.resident.id.to_string(),
            support_worker_id: s.worker.id.to_string(),
            property_id: s.property.id.to_string(),
            support_type: "medication".to_string(),
            session_date: "2024-03-01".to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            ..SessionInput::default()
        };
        let first_input = input("09:00", "10:00");
        let second_input = input("09:30", "10:30");
        let mut scheduler = Scheduler::new(s.db);

        let first = scheduler.create(&first_input, "admin").unwrap();
        match scheduler.create(&second_input, "admin") {
            Err(ScheduleError::Conflict(conflict)) => {
                assert_eq!(conflict.conflicting_id, first.id);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn separate_connections_cannot_double_book() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("hs.db");

        let (property, resident, worker) = roster();
        let mut first = Database::open(&path).unwrap();
        first.insert_property(&property).unwrap();
        first.insert_resident(&resident).unwrap();
        first.insert_worker(&worker).unwrap();
        let mut second = Database::open(&path).unwrap();

        first
            .create(&session_for(&resident, &worker, "one", 1, ("09:00", "10:00")))
            .unwrap();
        let err = second
            .create(&session_for(&resident, &worker, "two", 1, ("09:15", "09:45")))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Overlap { .. }));

        drop(first);
        let reopened = Database::open(&path).unwrap();
        assert!(reopened.find_by_id(&SessionId::new("one").unwrap()).unwrap().is_some());
    }
}
