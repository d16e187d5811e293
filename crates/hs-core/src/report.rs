//! Monthly summary reports and CSV export.
//!
//! Report functions are pure: callers load the period's sessions and the
//! roster, and get back ordered rows. Per-entity rows are independent of each
//! other and are computed with rayon.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::filter::SessionFilter;
use crate::format::format_hours;
use crate::model::{Property, Resident, Session, SupportWorker};
use crate::types::{PropertyId, ResidentId, SessionStatus, SupportType, ValidationError, WorkerId};
use crate::utilization::{
    OccupancyRecord, Period, SessionCounts, UtilizationRecord, completed_hours, occupancy,
    percentage, round1, utilization,
};

/// Content type of exported summaries.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Header row of the resident utilization CSV.
pub const CSV_HEADER: [&str; 6] = [
    "Resident",
    "Property",
    "Allocated Hours",
    "Hours Used",
    "Utilization %",
    "Remaining Hours",
];

/// Shown in place of a property name that cannot be resolved.
const UNKNOWN_PROPERTY: &str = "(unknown)";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write CSV")]
    Csv(#[from] csv::Error),

    #[error("CSV output is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("failed to flush CSV output")]
    Io(#[from] io::Error),
}

// ========== Query ==========

/// Selects the month, and optionally the property, a summary covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportQuery {
    pub year: i32,
    pub month: u32,
    pub property_id: Option<PropertyId>,
}

impl ReportQuery {
    pub const fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            property_id: None,
        }
    }

    #[must_use]
    pub fn property(mut self, id: PropertyId) -> Self {
        self.property_id = Some(id);
        self
    }

    /// First through last day of the month.
    pub fn period(&self) -> Result<Period, ValidationError> {
        Period::month(self.year, self.month)
    }

    /// Filter for loading the report's sessions.
    pub fn filter(&self) -> SessionFilter {
        match &self.property_id {
            Some(id) => SessionFilter::all().property(id.clone()),
            None => SessionFilter::all(),
        }
    }
}

// ========== Rows ==========

/// Sessions of one support type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportTypeRow {
    pub support_type: SupportType,
    pub session_count: usize,
    /// Scheduled hours across every status.
    pub total_hours: f64,
    pub average_minutes: f64,
    pub completed: usize,
    pub cancelled: usize,
    pub no_show: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRollup {
    pub property_id: PropertyId,
    pub name: String,
    pub occupancy: OccupancyRecord,
    pub sessions: SessionCounts,
    /// Completed hours.
    pub delivered_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerRollup {
    pub worker_id: WorkerId,
    pub name: String,
    pub utilization: UtilizationRecord,
    pub sessions: SessionCounts,
    pub completion_rate: f64,
    pub residents_served: usize,
    pub working_days: usize,
    /// Zero when the worker has no working days.
    pub average_hours_per_day: f64,
}

impl WorkerRollup {
    pub const fn hours_worked(&self) -> f64 {
        self.utilization.used_hours
    }
}

/// One line of the resident utilization table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidentRow {
    pub resident_id: ResidentId,
    pub resident_name: String,
    pub property_name: String,
    #[serde(flatten)]
    pub utilization: UtilizationRecord,
}

impl ResidentRow {
    /// The row's CSV fields, in header order.
    pub fn csv_record(&self) -> [String; 6] {
        [
            self.resident_name.clone(),
            self.property_name.clone(),
            format_hours(self.utilization.allocated_hours),
            format_hours(self.utilization.used_hours),
            format_hours(self.utilization.utilization_pct),
            format_hours(self.utilization.remaining_hours),
        ]
    }
}

/// Sums over every resident row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTotals {
    pub allocated_hours: f64,
    pub used_hours: f64,
    pub remaining_hours: f64,
    pub utilization_pct: f64,
    pub sessions: SessionCounts,
}

/// Everything shown for one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub query: ReportQuery,
    pub period: Period,
    pub totals: ReportTotals,
    pub residents: Vec<ResidentRow>,
    pub properties: Vec<PropertyRollup>,
    pub workers: Vec<WorkerRollup>,
    pub support_types: Vec<SupportTypeRow>,
}

// ========== Composition ==========

/// Builds the monthly summary.
///
/// `sessions` may contain sessions outside the query; only those dated in the
/// month (and at the queried property, if any) are counted.
pub fn compose(
    query: &ReportQuery,
    properties: &[Property],
    residents: &[Resident],
    workers: &[SupportWorker],
    sessions: &[Session],
) -> Result<MonthlySummary, ValidationError> {
    let period = query.period()?;
    let predicate = query.filter().to_predicate().between_dates(period.start, period.end);
    let sessions: Vec<Session> = sessions
        .iter()
        .filter(|s| predicate.matches(s))
        .cloned()
        .collect();

    let in_scope = |property_id: &PropertyId| {
        query.property_id.as_ref().is_none_or(|wanted| wanted == property_id)
    };
    let properties: Vec<Property> = properties
        .iter()
        .filter(|p| in_scope(&p.id))
        .cloned()
        .collect();
    let residents: Vec<Resident> = residents
        .iter()
        .filter(|r| in_scope(&r.property_id))
        .cloned()
        .collect();

    let resident_rows = resident_rows(&residents, &properties, &sessions, &period);
    let summary = MonthlySummary {
        query: query.clone(),
        period,
        totals: totals(&resident_rows, &sessions, &period),
        properties: property_rollups(&properties, &residents, &sessions, &period),
        workers: worker_rollups(workers, &sessions, &period),
        support_types: support_type_distribution(&sessions),
        residents: resident_rows,
    };
    tracing::debug!(
        year = query.year,
        month = query.month,
        sessions = sessions.len(),
        residents = summary.residents.len(),
        "composed monthly summary"
    );
    Ok(summary)
}

fn totals(rows: &[ResidentRow], sessions: &[Session], period: &Period) -> ReportTotals {
    // An empty float sum is -0.0; adding 0.0 keeps it from printing as "-0.0".
    let allocated_hours = rows.iter().map(|r| r.utilization.allocated_hours).sum::<f64>() + 0.0;
    let used_hours = rows.iter().map(|r| r.utilization.used_hours).sum::<f64>() + 0.0;
    ReportTotals {
        allocated_hours,
        used_hours,
        remaining_hours: allocated_hours - used_hours,
        utilization_pct: percentage(used_hours, allocated_hours),
        sessions: SessionCounts::tally(sessions, period),
    }
}

/// Per support type counts and hours, by total hours descending.
#[allow(clippy::cast_precision_loss)]
pub fn support_type_distribution(sessions: &[Session]) -> Vec<SupportTypeRow> {
    let mut groups: BTreeMap<&SupportType, (SessionCounts, u32)> = BTreeMap::new();
    for session in sessions {
        let (counts, minutes) = groups.entry(&session.support_type).or_default();
        counts.add(session.status);
        *minutes += session.duration_minutes();
    }

    let mut rows: Vec<SupportTypeRow> = groups
        .into_iter()
        .map(|(support_type, (counts, minutes))| SupportTypeRow {
            support_type: support_type.clone(),
            session_count: counts.total,
            total_hours: f64::from(minutes) / 60.0,
            average_minutes: if counts.total == 0 {
                0.0
            } else {
                round1(f64::from(minutes) / counts.total as f64)
            },
            completed: counts.completed,
            cancelled: counts.cancelled,
            no_show: counts.no_show,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_hours
            .total_cmp(&a.total_hours)
            .then_with(|| a.support_type.as_str().cmp(b.support_type.as_str()))
    });
    rows
}

/// Per property occupancy and delivered hours, by delivered hours descending.
pub fn property_rollups(
    properties: &[Property],
    residents: &[Resident],
    sessions: &[Session],
    period: &Period,
) -> Vec<PropertyRollup> {
    let by_property = group_by(sessions, |s| &s.property_id);
    let mut rows: Vec<PropertyRollup> = properties
        .par_iter()
        .map(|property| {
            let own = by_property.get(&property.id).map_or(&[][..], Vec::as_slice);
            PropertyRollup {
                property_id: property.id.clone(),
                name: property.name.clone(),
                occupancy: occupancy(property, residents),
                sessions: SessionCounts::tally(own, period),
                delivered_hours: completed_hours(own, period),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.delivered_hours
            .total_cmp(&a.delivered_hours)
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

/// Per worker hours and utilization, by hours worked descending.
///
/// Inactive workers appear only if they have sessions in the slice.
#[allow(clippy::cast_precision_loss)]
pub fn worker_rollups(
    workers: &[SupportWorker],
    sessions: &[Session],
    period: &Period,
) -> Vec<WorkerRollup> {
    let by_worker = group_by(sessions, |s| &s.support_worker_id);
    let mut rows: Vec<WorkerRollup> = workers
        .par_iter()
        .filter(|w| w.is_active || by_worker.contains_key(&w.id))
        .map(|worker| {
            let own = by_worker.get(&worker.id).map_or(&[][..], Vec::as_slice);
            let completed: Vec<&Session> = own
                .iter()
                .filter(|s| s.status == SessionStatus::Completed && period.contains(s.session_date))
                .collect();
            let residents_served: BTreeSet<&ResidentId> =
                completed.iter().map(|s| &s.resident_id).collect();
            let working_days: BTreeSet<NaiveDate> =
                completed.iter().map(|s| s.session_date).collect();

            let record = utilization(worker, own, period);
            let sessions = SessionCounts::tally(own, period);
            let average_hours_per_day = if working_days.is_empty() {
                0.0
            } else {
                round1(record.used_hours / working_days.len() as f64)
            };
            WorkerRollup {
                worker_id: worker.id.clone(),
                name: worker.name.clone(),
                utilization: record,
                completion_rate: sessions.completion_rate(),
                sessions,
                residents_served: residents_served.len(),
                working_days: working_days.len(),
                average_hours_per_day,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.hours_worked()
            .total_cmp(&a.hours_worked())
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

/// One utilization row per resident, by property name then resident name.
///
/// Inactive residents appear only if they have sessions in the slice.
pub fn resident_rows(
    residents: &[Resident],
    properties: &[Property],
    sessions: &[Session],
    period: &Period,
) -> Vec<ResidentRow> {
    let by_resident = group_by(sessions, |s| &s.resident_id);
    let names: HashMap<&PropertyId, &str> = properties
        .iter()
        .map(|p| (&p.id, p.name.as_str()))
        .collect();

    let mut rows: Vec<ResidentRow> = residents
        .par_iter()
        .filter(|r| r.is_active || by_resident.contains_key(&r.id))
        .map(|resident| {
            let own = by_resident.get(&resident.id).map_or(&[][..], Vec::as_slice);
            ResidentRow {
                resident_id: resident.id.clone(),
                resident_name: resident.name.clone(),
                property_name: names
                    .get(&resident.property_id)
                    .copied()
                    .unwrap_or(UNKNOWN_PROPERTY)
                    .to_string(),
                utilization: utilization(resident, own, period),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.property_name
            .cmp(&b.property_name)
            .then_with(|| a.resident_name.cmp(&b.resident_name))
    });
    rows
}

fn group_by<'a, K, F>(sessions: &'a [Session], key: F) -> HashMap<&'a K, Vec<Session>>
where
    K: std::hash::Hash + Eq + 'a,
    F: Fn(&'a Session) -> &'a K,
{
    let mut groups: HashMap<&K, Vec<Session>> = HashMap::new();
    for session in sessions {
        groups.entry(key(session)).or_default().push(session.clone());
    }
    groups
}

// ========== CSV ==========

/// Export file name for a month, e.g. `monthly-summary-2024-03.csv`.
pub fn csv_filename(year: i32, month: u32) -> String {
    format!("monthly-summary-{year}-{month:02}.csv")
}

/// Writes the resident table as CSV, quoting every field.
pub fn write_csv<W: io::Write>(rows: &[ResidentRow], writer: W) -> Result<(), ReportError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record(row.csv_record())?;
    }
    writer.flush()?;
    Ok(())
}

/// The resident table as a CSV string.
pub fn to_csv(rows: &[ResidentRow]) -> Result<String, ReportError> {
    let mut buffer = Vec::new();
    write_csv(rows, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::interval::TimeInterval;
    use crate::types::SessionId;

    struct World {
        properties: Vec<Property>,
        residents: Vec<Resident>,
        workers: Vec<SupportWorker>,
    }

    fn world() -> World {
        let elm = Property::new("Elm House", 4).unwrap();
        let oak = Property::new("Oak Court", 2).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let residents = vec![
            Resident::new("Alex", elm.id.clone(), 2.0, start).unwrap(),
            Resident::new("Blair", oak.id.clone(), 4.0, start).unwrap(),
            Resident::new("Casey", elm.id.clone(), 0.0, start).unwrap(),
        ];
        let workers = vec![
            SupportWorker::new("Sam", 20.0, 80.0, BTreeSet::new()).unwrap(),
            SupportWorker::new("Robin", 10.0, 40.0, BTreeSet::new()).unwrap(),
        ];
        World {
            properties: vec![elm, oak],
            residents,
            workers,
        }
    }

    fn session(
        resident: &Resident,
        worker: &SupportWorker,
        kind: SupportType,
        day: u32,
        (start, end): (&str, &str),
        status: SessionStatus,
    ) -> Session {
        Session {
            id: SessionId::generate(),
            resident_id: resident.id.clone(),
            support_worker_id: worker.id.clone(),
            property_id: resident.property_id.clone(),
            support_type: kind,
            session_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            interval: TimeInterval::parse(start, end).unwrap(),
            status,
            notes: None,
            created_by: "admin".to_string(),
        }
    }

    fn march_sessions(w: &World) -> Vec<Session> {
        use SessionStatus::{Cancelled, Completed, NoShow};
        use SupportType::{Budgeting, Medication, PersonalCare};

        let (alex, blair) = (&w.residents[0], &w.residents[1]);
        let (sam, robin) = (&w.workers[0], &w.workers[1]);
        vec![
            session(alex, sam, PersonalCare, 4, ("09:00", "10:00"), Completed),
            session(alex, sam, PersonalCare, 11, ("09:00", "09:30"), Completed),
            session(alex, sam, Medication, 12, ("09:00", "10:00"), Cancelled),
            session(blair, robin, Budgeting, 5, ("13:00", "16:00"), Completed),
            session(blair, robin, Budgeting, 6, ("13:00", "14:00"), NoShow),
        ]
    }

    #[test]
    fn resident_csv_quotes_every_field() {
        let w = world();
        let period = Period::month(2024, 3).unwrap();
        let rows = resident_rows(&w.residents, &w.properties, &march_sessions(&w), &period);
        let csv = to_csv(&rows).unwrap();
        insta::assert_snapshot!(csv, @r#"
        "Resident","Property","Allocated Hours","Hours Used","Utilization %","Remaining Hours"
        "Alex","Elm House","2.0","1.5","75.0","0.5"
        "Casey","Elm House","0.0","0.0","0.0","0.0"
        "Blair","Oak Court","4.0","3.0","75.0","1.0"
        "#);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "values are exact in binary")]
    fn support_types_sorted_by_total_hours() {
        let w = world();
        let rows = support_type_distribution(&march_sessions(&w));
        let order: Vec<&str> = rows.iter().map(|r| r.support_type.as_str()).collect();
        assert_eq!(order, vec!["budgeting", "personal_care", "medication"]);

        let budgeting = &rows[0];
        assert_eq!(budgeting.session_count, 2);
        assert_eq!(budgeting.total_hours, 4.0);
        assert_eq!(budgeting.average_minutes, 120.0);
        assert_eq!(budgeting.completed, 1);
        assert_eq!(budgeting.no_show, 1);

        assert_eq!(rows[2].cancelled, 1);
        assert_eq!(rows[1].average_minutes, 45.0);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "values are exact in binary")]
    fn worker_rollups_count_distinct_residents_and_days() {
        let w = world();
        let period = Period::month(2024, 3).unwrap();
        let rows = worker_rollups(&w.workers, &march_sessions(&w), &period);

        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Robin", "Sam"]);

        let robin = &rows[0];
        assert_eq!(robin.hours_worked(), 3.0);
        assert_eq!(robin.working_days, 1);
        assert_eq!(robin.residents_served, 1);
        assert_eq!(robin.average_hours_per_day, 3.0);
        assert_eq!(robin.completion_rate, 50.0);
        assert_eq!(robin.utilization.utilization_pct, 7.5);

        let sam = &rows[1];
        assert_eq!(sam.working_days, 2);
        assert_eq!(sam.average_hours_per_day, 0.8);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "zero guard returns exactly zero")]
    fn idle_worker_has_zero_average() {
        let w = world();
        let period = Period::month(2024, 3).unwrap();
        let rows = worker_rollups(&w.workers, &[], &period);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.working_days == 0));
        assert!(rows.iter().all(|r| r.average_hours_per_day == 0.0));
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "values are exact in binary")]
    fn property_rollups_report_occupancy_and_hours() {
        let w = world();
        let period = Period::month(2024, 3).unwrap();
        let rows = property_rollups(&w.properties, &w.residents, &march_sessions(&w), &period);

        assert_eq!(rows[0].name, "Oak Court");
        assert_eq!(rows[0].delivered_hours, 3.0);
        assert_eq!(rows[0].occupancy.occupancy_pct, 50.0);
        assert_eq!(rows[1].name, "Elm House");
        assert_eq!(rows[1].occupancy.current_residents, 2);
        assert_eq!(rows[1].sessions.total, 3);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "values are exact in binary")]
    fn compose_scopes_to_property_and_month() {
        let w = world();
        let mut sessions = march_sessions(&w);
        let mut april = sessions[0].clone();
        april.session_date = NaiveDate::from_ymd_opt(2024, 4, 2).unwrap();
        sessions.push(april);

        let elm = w.properties[0].id.clone();
        let query = ReportQuery::new(2024, 3).property(elm);
        let summary = compose(&query, &w.properties, &w.residents, &w.workers, &sessions).unwrap();

        assert_eq!(summary.properties.len(), 1);
        let names: Vec<&str> = summary.residents.iter().map(|r| r.resident_name.as_str()).collect();
        assert_eq!(names, vec!["Alex", "Casey"]);
        assert_eq!(summary.totals.allocated_hours, 2.0);
        assert_eq!(summary.totals.used_hours, 1.5);
        assert_eq!(summary.totals.sessions.total, 3);
        assert_eq!(summary.period.end, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn compose_rejects_invalid_month() {
        let w = world();
        let query = ReportQuery::new(2024, 13);
        assert_eq!(
            compose(&query, &w.properties, &w.residents, &w.workers, &[]).unwrap_err(),
            ValidationError::InvalidMonth { month: 13 }
        );
    }

    #[test]
    fn empty_totals_are_positive_zero() {
        let w = world();
        let summary = compose(&ReportQuery::new(2024, 3), &w.properties, &[], &w.workers, &[])
            .unwrap();
        assert!(summary.totals.allocated_hours.is_sign_positive());
        assert!(summary.totals.used_hours.is_sign_positive());
        assert_eq!(format_hours(summary.totals.remaining_hours), "0.0");
    }

    #[test]
    fn csv_filename_pads_month() {
        assert_eq!(csv_filename(2024, 3), "monthly-summary-2024-03.csv");
        assert_eq!(csv_filename(2024, 11), "monthly-summary-2024-11.csv");
        assert_eq!(CSV_CONTENT_TYPE, "text/csv");
    }
}
