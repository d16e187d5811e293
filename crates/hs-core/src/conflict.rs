//! Worker double-booking detection.
//!
//! A worker can only be in one place at a time: two active sessions for the
//! same worker on the same date must not have overlapping `[start, end)`
//! intervals. Sessions that merely touch (one ends as the next starts) are fine.

use serde::Serialize;
use thiserror::Error;

use crate::interval::TimeInterval;
use crate::model::Session;
use crate::types::SessionId;

/// A proposed session overlaps one already on the worker's schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error(
    "worker already scheduled at this time (session {conflicting_id}{})",
    interval_suffix(.conflicting_interval)
)]
pub struct ConflictError {
    /// The existing session that overlaps the candidate.
    pub conflicting_id: SessionId,
    /// When the existing session runs, if known.
    pub conflicting_interval: Option<TimeInterval>,
}

/// `", 09:00–10:00"` when the interval is known.
#[allow(clippy::ref_option)]
fn interval_suffix(interval: &Option<TimeInterval>) -> String {
    interval.map(|i| format!(", {i}")).unwrap_or_default()
}

/// Checks a candidate session against the worker's existing sessions.
///
/// `existing` is expected to hold the worker's active sessions for the
/// candidate's date, minus the candidate itself. Entries that do not satisfy
/// that are skipped, so a broader list is still safe to pass.
///
/// When several sessions overlap, the one starting earliest is reported
/// (ties broken by ID) so the answer does not depend on input order.
pub fn check_conflict(candidate: &Session, existing: &[Session]) -> Result<(), ConflictError> {
    if !candidate.is_active() {
        return Ok(());
    }

    let mut relevant: Vec<&Session> = existing
        .iter()
        .filter(|other| {
            other.id != candidate.id
                && other.is_active()
                && other.support_worker_id == candidate.support_worker_id
                && other.session_date == candidate.session_date
        })
        .collect();
    relevant.sort_by(|a, b| {
        a.interval
            .start_minute()
            .cmp(&b.interval.start_minute())
            .then_with(|| a.id.cmp(&b.id))
    });

    match relevant
        .into_iter()
        .find(|other| other.interval.overlaps(candidate.interval))
    {
        Some(other) => {
            tracing::debug!(
                candidate = %candidate.id,
                conflicting = %other.id,
                worker = %candidate.support_worker_id,
                date = %candidate.session_date,
                "session conflict detected"
            );
            Err(ConflictError {
                conflicting_id: other.id.clone(),
                conflicting_interval: Some(other.interval),
            })
        }
        None => Ok(()),
    }
}
