//! Monthly utilization report.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use clap::Args;
use hs_core::format::{format_hours, format_percent, month_label};
use hs_core::report::compose;
use hs_core::{MonthlySummary, PropertyId, ReportQuery, Roster, SessionRepository};
use hs_db::Database;

use super::{open_database, truncate};
use crate::Config;

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Year (defaults to the current year).
    #[arg(long)]
    pub year: Option<i32>,
    /// Month, 1-12 (defaults to the current month).
    #[arg(long)]
    pub month: Option<u32>,
    /// Only this property.
    #[arg(long)]
    pub property: Option<String>,
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &ReportArgs, config: &Config) -> Result<()> {
    let today = Local::now().date_naive();
    let query = build_query(args.year, args.month, args.property.as_deref(), today)?;
    let db = open_database(config)?;
    let summary = load_summary(&db, &query)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&summary)?)?;
        return Ok(());
    }
    render(writer, &summary)
}

/// The report query for a month, defaulting to the month containing `today`.
pub fn build_query(
    year: Option<i32>,
    month: Option<u32>,
    property: Option<&str>,
    today: NaiveDate,
) -> Result<ReportQuery> {
    let mut query = ReportQuery::new(
        year.unwrap_or_else(|| today.year()),
        month.unwrap_or_else(|| today.month()),
    );
    if let Some(id) = property {
        query = query.property(PropertyId::new(id)?);
    }
    Ok(query)
}

/// Loads the month's sessions and roster and composes the summary.
pub fn load_summary(db: &Database, query: &ReportQuery) -> Result<MonthlySummary> {
    let period = query.period()?;
    let sessions = db
        .find_by_date_range(period.start, period.end, &query.filter())
        .context("failed to load sessions")?;
    let summary = compose(
        query,
        &db.list_properties()?,
        &db.list_residents()?,
        &db.list_workers()?,
        &sessions,
    )?;
    Ok(summary)
}

fn render<W: Write>(writer: &mut W, summary: &MonthlySummary) -> Result<()> {
    let totals = &summary.totals;
    writeln!(
        writer,
        "Monthly summary: {}",
        month_label(summary.query.year, summary.query.month)
    )?;
    writeln!(writer)?;
    writeln!(
        writer,
        "Allocated {}h  Used {}h  Remaining {}h  Utilization {}",
        format_hours(totals.allocated_hours),
        format_hours(totals.used_hours),
        format_hours(totals.remaining_hours),
        format_percent(totals.utilization_pct)
    )?;
    writeln!(
        writer,
        "Sessions {} ({} completed, {} planned, {} cancelled, {} no-show)",
        totals.sessions.total,
        totals.sessions.completed,
        totals.sessions.planned,
        totals.sessions.cancelled,
        totals.sessions.no_show
    )?;

    writeln!(writer)?;
    writeln!(writer, "Residents")?;
    if summary.residents.is_empty() {
        writeln!(writer, "  (none)")?;
    }
    for row in &summary.residents {
        let u = &row.utilization;
        writeln!(
            writer,
            "  {:<20}  {:<20}  {:>7}  {:>7}  {:>7}  {:>7}",
            truncate(&row.resident_name, 20),
            truncate(&row.property_name, 20),
            format_hours(u.allocated_hours),
            format_hours(u.used_hours),
            format_percent(u.utilization_pct),
            format_hours(u.remaining_hours)
        )?;
    }

    writeln!(writer)?;
    writeln!(writer, "Properties")?;
    if summary.properties.is_empty() {
        writeln!(writer, "  (none)")?;
    }
    for row in &summary.properties {
        writeln!(
            writer,
            "  {:<20}  {}/{} residents ({})  {} sessions  {}h delivered",
            truncate(&row.name, 20),
            row.occupancy.current_residents,
            row.occupancy.max_capacity,
            format_percent(row.occupancy.occupancy_pct),
            row.sessions.total,
            format_hours(row.delivered_hours)
        )?;
    }

    writeln!(writer)?;
    writeln!(writer, "Support workers")?;
    if summary.workers.is_empty() {
        writeln!(writer, "  (none)")?;
    }
    for row in &summary.workers {
        writeln!(
            writer,
            "  {:<20}  {}h of {}h ({})  {} sessions, {} completed  {} residents  {}h/day",
            truncate(&row.name, 20),
            format_hours(row.hours_worked()),
            format_hours(row.utilization.allocated_hours),
            format_percent(row.utilization.utilization_pct),
            row.sessions.total,
            format_percent(row.completion_rate),
            row.residents_served,
            format_hours(row.average_hours_per_day)
        )?;
    }

    writeln!(writer)?;
    writeln!(writer, "Support types")?;
    if summary.support_types.is_empty() {
        writeln!(writer, "  (none)")?;
    }
    for row in &summary.support_types {
        writeln!(
            writer,
            "  {:<20}  {} sessions  {}h  avg {}m",
            truncate(row.support_type.as_str(), 20),
            row.session_count,
            format_hours(row.total_hours),
            format_hours(row.average_minutes)
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use hs_core::{Property, Resident, SessionId, SessionInput, SupportWorker};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// A property with one resident and one worker, and three March sessions:
    /// two completed (1.5h and 1h) and one cancelled.
    fn seeded_config() -> (tempfile::TempDir, Config) {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: temp.path().join("hs.db"),
            ..Config::default()
        };
        let property = Property::new("Elm House", 4).unwrap();
        let resident = Resident::new("Alex", property.id.clone(), 10.0, date(2024, 1, 1)).unwrap();
        let worker = SupportWorker::new("Sam", 37.5, 150.0, BTreeSet::new()).unwrap();
        let mut db = Database::open(&config.database_path).unwrap();
        db.insert_property(&property).unwrap();
        db.insert_resident(&resident).unwrap();
        db.insert_worker(&worker).unwrap();

        for (day, start, end, status) in [
            ("2024-03-01", "09:00", "10:30", "completed"),
            ("2024-03-02", "09:00", "10:00", "completed"),
            ("2024-03-03", "09:00", "10:00", "cancelled"),
            ("2024-04-01", "09:00", "10:00", "completed"),
        ] {
            let input = SessionInput {
                resident_id: resident.id.to_string(),
                support_worker_id: worker.id.to_string(),
                property_id: property.id.to_string(),
                support_type: "personal_care".to_string(),
                session_date: day.to_string(),
                start_time: start.to_string(),
                end_time: end.to_string(),
                status: Some(status.to_string()),
                ..SessionInput::default()
            };
            let session = input
                .validate()
                .unwrap()
                .into_session(SessionId::generate(), "admin");
            db.create(&session).unwrap();
        }
        (temp, config)
    }

    #[test]
    fn summary_counts_only_the_month() {
        let (_temp, config) = seeded_config();
        let db = Database::open(&config.database_path).unwrap();
        let summary = load_summary(&db, &ReportQuery::new(2024, 3)).unwrap();

        assert_eq!(summary.totals.sessions.total, 3);
        assert!((summary.totals.used_hours - 2.5).abs() < f64::EPSILON);
        assert!((summary.totals.utilization_pct - 25.0).abs() < f64::EPSILON);
        assert_eq!(summary.workers[0].working_days, 2);
    }

    #[test]
    fn text_report_has_every_section() {
        let (_temp, config) = seeded_config();
        let args = ReportArgs {
            year: Some(2024),
            month: Some(3),
            property: None,
            json: false,
        };
        let mut output = Vec::new();
        run(&mut output, &args, &config).unwrap();
        let output = String::from_utf8(output).unwrap();

        insta::assert_snapshot!(output, @r"
        Monthly summary: March 2024

        Allocated 10.0h  Used 2.5h  Remaining 7.5h  Utilization 25.0%
        Sessions 3 (2 completed, 0 planned, 1 cancelled, 0 no-show)

        Residents
          Alex                  Elm House                10.0      2.5    25.0%      7.5

        Properties
          Elm House             1/4 residents (25.0%)  3 sessions  2.5h delivered

        Support workers
          Sam                   2.5h of 150.0h (1.7%)  3 sessions, 66.7% completed  1 residents  1.3h/day

        Support types
          personal_care         3 sessions  3.5h  avg 70.0m
        ");
    }

    #[test]
    fn empty_month_marks_every_section() {
        let (_temp, config) = seeded_config();
        let args = ReportArgs {
            year: Some(2024),
            month: Some(3),
            property: Some("elsewhere".to_string()),
            json: false,
        };
        let mut output = Vec::new();
        run(&mut output, &args, &config).unwrap();
        insta::assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Monthly summary: March 2024

        Allocated 0.0h  Used 0.0h  Remaining 0.0h  Utilization 0.0%
        Sessions 0 (0 completed, 0 planned, 0 cancelled, 0 no-show)

        Residents
          (none)

        Properties
          (none)

        Support workers
          Sam                   0.0h of 150.0h (0.0%)  0 sessions, 0.0% completed  0 residents  0.0h/day

        Support types
          (none)
        ");
    }

    #[test]
    fn unknown_property_filter_gives_empty_report() {
        let (_temp, config) = seeded_config();
        let args = ReportArgs {
            year: Some(2024),
            month: Some(3),
            property: Some("elsewhere".to_string()),
            json: true,
        };
        let mut output = Vec::new();
        run(&mut output, &args, &config).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["totals"]["sessions"]["total"], 0);
        assert_eq!(value["residents"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn build_query_defaults_and_rejects_bad_month() {
        let query = build_query(None, None, None, date(2024, 7, 15)).unwrap();
        assert_eq!((query.year, query.month), (2024, 7));

        let db = Database::open_in_memory().unwrap();
        let query = build_query(Some(2024), Some(13), None, date(2024, 7, 15)).unwrap();
        let err = load_summary(&db, &query).unwrap_err();
        assert!(err.to_string().contains("month must be between 1 and 12"));
    }
}
