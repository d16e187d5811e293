//! Session commands: book, change, cancel and list support sessions.
//!
//! Every write goes through the scheduler, so overlapping bookings for a
//! worker are refused with the ID of the session already in that slot.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Args, Subcommand};
use hs_core::format::{format_duration_minutes, short_id};
use hs_core::{
    PropertyId, ResidentId, Roster, Scheduler, Session, SessionFilter, SessionId, SessionInput,
    SessionStatus, SupportType, WorkerId,
};
use hs_db::Database;
use serde::Serialize;

use super::{Names, open_database, truncate};
use crate::Config;

#[derive(Debug, Subcommand)]
pub enum SessionAction {
    /// Book a new session.
    Add(SessionAddArgs),
    /// Change an existing session. Omitted fields keep their current value.
    Update(SessionUpdateArgs),
    /// Set a session's status (planned, completed, cancelled, no_show).
    Status {
        /// Session ID.
        id: String,
        /// New status.
        status: String,
    },
    /// Delete a session.
    Delete {
        /// Session ID.
        id: String,
    },
    /// Show one session.
    Show {
        /// Session ID.
        id: String,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List sessions in a date range.
    List(SessionListArgs),
}

#[derive(Debug, Args)]
pub struct SessionAddArgs {
    /// Resident ID.
    #[arg(long)]
    pub resident: String,
    /// Support worker ID.
    #[arg(long)]
    pub worker: String,
    /// Property ID (defaults to the resident's property).
    #[arg(long)]
    pub property: Option<String>,
    /// Support type, e.g. `personal_care` or `medication`.
    #[arg(long = "type")]
    pub support_type: String,
    /// Session date (YYYY-MM-DD).
    #[arg(long)]
    pub date: String,
    /// Start time (HH:MM).
    #[arg(long)]
    pub start: String,
    /// End time (HH:MM).
    #[arg(long)]
    pub end: String,
    /// Declared duration in minutes; must match start and end.
    #[arg(long)]
    pub duration: Option<u32>,
    /// Initial status (defaults to planned).
    #[arg(long)]
    pub status: Option<String>,
    /// Free-text notes.
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct SessionUpdateArgs {
    /// Session ID.
    pub id: String,
    #[arg(long)]
    pub resident: Option<String>,
    #[arg(long)]
    pub worker: Option<String>,
    #[arg(long)]
    pub property: Option<String>,
    #[arg(long = "type")]
    pub support_type: Option<String>,
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub start: Option<String>,
    #[arg(long)]
    pub end: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct SessionListArgs {
    /// First date (inclusive).
    #[arg(long)]
    pub from: NaiveDate,
    /// Last date (inclusive); defaults to `--from`.
    #[arg(long)]
    pub to: Option<NaiveDate>,
    #[arg(long)]
    pub property: Option<String>,
    #[arg(long)]
    pub resident: Option<String>,
    #[arg(long)]
    pub worker: Option<String>,
    #[arg(long = "type")]
    pub support_type: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, action: &SessionAction, config: &Config) -> Result<()> {
    let now = Local::now().naive_local();
    match action {
        SessionAction::Add(args) => add(writer, args, config),
        SessionAction::Update(args) => update(writer, args, config, now),
        SessionAction::Status { id, status } => set_status(writer, id, status, config, now),
        SessionAction::Delete { id } => delete(writer, id, config, now),
        SessionAction::Show { id, json } => show(writer, id, *json, config),
        SessionAction::List(args) => list(writer, args, config),
    }
}

fn scheduler(config: &Config) -> Result<Scheduler<Database>> {
    Ok(Scheduler::with_policy(open_database(config)?, config.policy()))
}

// ========== Writes ==========

fn add<W: Write>(writer: &mut W, args: &SessionAddArgs, config: &Config) -> Result<()> {
    let mut scheduler = scheduler(config)?;

    let property_id = match &args.property {
        Some(property) => property.clone(),
        None => {
            let resident_id = ResidentId::new(args.resident.as_str())?;
            let Some(resident) = scheduler.store().find_resident(&resident_id)? else {
                bail!("resident not found: {resident_id}");
            };
            resident.property_id.to_string()
        }
    };
    let input = SessionInput {
        resident_id: args.resident.clone(),
        support_worker_id: args.worker.clone(),
        property_id,
        support_type: args.support_type.clone(),
        session_date: args.date.clone(),
        start_time: args.start.clone(),
        end_time: args.end.clone(),
        duration_minutes: args.duration,
        status: args.status.clone(),
        notes: args.notes.clone(),
    };

    let session = scheduler.create(&input, &config.created_by)?;
    writeln!(
        writer,
        "Booked session {} on {} {}",
        session.id, session.session_date, session.interval
    )?;
    Ok(())
}

fn update<W: Write>(
    writer: &mut W,
    args: &SessionUpdateArgs,
    config: &Config,
    now: NaiveDateTime,
) -> Result<()> {
    let id = SessionId::new(args.id.as_str())?;
    let mut scheduler = scheduler(config)?;
    let existing = scheduler.get(&id)?;

    let mut input = SessionInput::from(&existing);
    let replace = |field: &mut String, value: &Option<String>| {
        if let Some(value) = value {
            field.clone_from(value);
        }
    };
    replace(&mut input.resident_id, &args.resident);
    replace(&mut input.support_worker_id, &args.worker);
    replace(&mut input.property_id, &args.property);
    replace(&mut input.support_type, &args.support_type);
    replace(&mut input.session_date, &args.date);
    replace(&mut input.start_time, &args.start);
    replace(&mut input.end_time, &args.end);
    // The stored duration follows the times; a stale one would fail validation.
    input.duration_minutes = None;
    if args.status.is_some() {
        input.status.clone_from(&args.status);
    }
    if args.notes.is_some() {
        input.notes.clone_from(&args.notes);
    }

    let session = scheduler.update(&id, &input, now)?;
    writeln!(
        writer,
        "Updated session {} on {} {}",
        session.id, session.session_date, session.interval
    )?;
    Ok(())
}

fn set_status<W: Write>(
    writer: &mut W,
    id: &str,
    status: &str,
    config: &Config,
    now: NaiveDateTime,
) -> Result<()> {
    let id = SessionId::new(id)?;
    let status: SessionStatus = status.parse()?;
    let mut scheduler = scheduler(config)?;
    let session = scheduler.set_status(&id, status, now)?;
    writeln!(writer, "Session {} is now {}", session.id, session.status)?;
    Ok(())
}

fn delete<W: Write>(writer: &mut W, id: &str, config: &Config, now: NaiveDateTime) -> Result<()> {
    let id = SessionId::new(id)?;
    let mut scheduler = scheduler(config)?;
    scheduler.delete(&id, now)?;
    writeln!(writer, "Deleted session {id}")?;
    Ok(())
}

// ========== Reads ==========

fn show<W: Write>(writer: &mut W, id: &str, json: bool, config: &Config) -> Result<()> {
    let id = SessionId::new(id)?;
    let scheduler = scheduler(config)?;
    let session = scheduler.get(&id)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&session)?)?;
        return Ok(());
    }
    let names = Names::load(scheduler.store())?;
    writeln!(writer, "Session   {}", session.id)?;
    writeln!(writer, "Date      {} {}", session.session_date, session.interval)?;
    writeln!(
        writer,
        "Duration  {}",
        format_duration_minutes(session.duration_minutes())
    )?;
    writeln!(writer, "Type      {}", session.support_type)?;
    writeln!(writer, "Resident  {}", names.resident(&session.resident_id))?;
    writeln!(writer, "Worker    {}", names.worker(&session.support_worker_id))?;
    writeln!(writer, "Status    {}", session.status)?;
    if let Some(notes) = &session.notes {
        writeln!(writer, "Notes     {notes}")?;
    }
    writeln!(writer, "Booked by {}", session.created_by)?;
    Ok(())
}

/// Envelope for `session list --json`.
#[derive(Debug, Serialize)]
struct JsonSessions<'a> {
    from: NaiveDate,
    to: NaiveDate,
    sessions: &'a [Session],
}

fn list<W: Write>(writer: &mut W, args: &SessionListArgs, config: &Config) -> Result<()> {
    let to = args.to.unwrap_or(args.from);
    if to < args.from {
        bail!("--to {to} is before --from {}", args.from);
    }
    let filter = list_filter(args)?;
    let scheduler = scheduler(config)?;
    let sessions = scheduler.sessions_between(args.from, to, &filter)?;

    if args.json {
        let json = JsonSessions {
            from: args.from,
            to,
            sessions: &sessions,
        };
        writeln!(writer, "{}", serde_json::to_string_pretty(&json)?)?;
        return Ok(());
    }
    let names = Names::load(scheduler.store())?;
    render_sessions(writer, &sessions, &names)
}

fn list_filter(args: &SessionListArgs) -> Result<SessionFilter> {
    let mut filter = SessionFilter::all();
    if let Some(id) = &args.property {
        filter = filter.property(PropertyId::new(id.as_str())?);
    }
    if let Some(id) = &args.resident {
        filter = filter.resident(ResidentId::new(id.as_str())?);
    }
    if let Some(id) = &args.worker {
        filter = filter.worker(WorkerId::new(id.as_str())?);
    }
    if let Some(kind) = &args.support_type {
        filter = filter.support_type(kind.parse::<SupportType>()?);
    }
    if let Some(status) = &args.status {
        filter = filter.status(status.parse::<SessionStatus>()?);
    }
    Ok(filter)
}

/// Writes sessions as a table, one line each.
pub fn render_sessions<W: Write>(
    writer: &mut W,
    sessions: &[Session],
    names: &Names,
) -> Result<()> {
    if sessions.is_empty() {
        writeln!(writer, "No sessions found.")?;
        return Ok(());
    }
    writeln!(
        writer,
        "{:<8}  {:<10}  {:<11}  {:<18}  {:<16}  {:<16}  Status",
        "ID", "Date", "Time", "Type", "Resident", "Worker"
    )?;
    for session in sessions {
        writeln!(
            writer,
            "{:<8}  {:<10}  {:<11}  {:<18}  {:<16}  {:<16}  {}",
            short_id(session.id.as_str()),
            session.session_date,
            session.interval.to_string(),
            truncate(session.support_type.as_str(), 18),
            truncate(names.resident(&session.resident_id), 16),
            truncate(names.worker(&session.support_worker_id), 16),
            session.status
        )
        .context("failed to write session row")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use hs_core::{Property, Resident, SupportWorker};

    use super::*;

    struct Setup {
        _temp: tempfile::TempDir,
        config: Config,
        resident: Resident,
        worker: SupportWorker,
    }

    fn setup() -> Setup {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: temp.path().join("hs.db"),
            ..Config::default()
        };
        let property = Property::new("Elm House", 4).unwrap();
        let resident = Resident::new(
            "Alex",
            property.id.clone(),
            2.0,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .unwrap();
        let worker = SupportWorker::new("Sam", 37.5, 150.0, BTreeSet::new()).unwrap();
        let mut db = Database::open(&config.database_path).unwrap();
        db.insert_property(&property).unwrap();
        db.insert_resident(&resident).unwrap();
        db.insert_worker(&worker).unwrap();
        Setup {
            _temp: temp,
            config,
            resident,
            worker,
        }
    }

    fn add_args(s: &Setup, start: &str, end: &str) -> SessionAddArgs {
        SessionAddArgs {
            resident: s.resident.id.to_string(),
            worker: s.worker.id.to_string(),
            property: None,
            support_type: "personal_care".to_string(),
            date: "2024-03-01".to_string(),
            start: start.to_string(),
            end: end.to_string(),
            duration: None,
            status: None,
            notes: None,
        }
    }

    fn stored_sessions(config: &Config) -> Vec<Session> {
        let db = Database::open(&config.database_path).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        hs_core::SessionRepository::find_by_date_range(&db, day, day, &SessionFilter::all())
            .unwrap()
    }

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn add_defaults_property_to_residents() {
        let s = setup();
        let mut output = Vec::new();
        add(&mut output, &add_args(&s, "09:00", "10:00"), &s.config).unwrap();
        assert!(String::from_utf8(output).unwrap().starts_with("Booked session"));

        let sessions = stored_sessions(&s.config);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].property_id, s.resident.property_id);
        assert_eq!(sessions[0].created_by, "admin");
    }

    #[test]
    fn overlapping_add_names_conflicting_session() {
        let s = setup();
        add(&mut Vec::new(), &add_args(&s, "09:00", "10:00"), &s.config).unwrap();
        let first = stored_sessions(&s.config).remove(0);

        let err = add(&mut Vec::new(), &add_args(&s, "09:30", "10:30"), &s.config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("worker already scheduled"), "{message}");
        assert!(message.contains(first.id.as_str()), "{message}");

        add(&mut Vec::new(), &add_args(&s, "10:00", "11:00"), &s.config).unwrap();
        assert_eq!(stored_sessions(&s.config).len(), 2);
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let s = setup();
        let mut args = add_args(&s, "09:00", "10:00");
        args.notes = Some("prefers mornings".to_string());
        add(&mut Vec::new(), &args, &s.config).unwrap();
        let original = stored_sessions(&s.config).remove(0);

        let update_args = SessionUpdateArgs {
            id: original.id.to_string(),
            resident: None,
            worker: None,
            property: None,
            support_type: None,
            date: None,
            start: Some("09:30".to_string()),
            end: Some("11:00".to_string()),
            status: None,
            notes: None,
        };
        update(&mut Vec::new(), &update_args, &s.config, at("2024-02-01 12:00")).unwrap();

        let updated = stored_sessions(&s.config).remove(0);
        assert_eq!(updated.duration_minutes(), 90);
        assert_eq!(updated.notes.as_deref(), Some("prefers mornings"));
        assert_eq!(updated.support_type, original.support_type);
    }

    #[test]
    fn status_change_respects_edit_lock() {
        let mut s = setup();
        s.config.edit_lock_hours = Some(48);
        add(&mut Vec::new(), &add_args(&s, "09:00", "10:00"), &s.config).unwrap();
        let id = stored_sessions(&s.config).remove(0).id;

        let mut output = Vec::new();
        let now = at("2024-03-01 10:30");
        set_status(&mut output, id.as_str(), "completed", &s.config, now).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("Session {id} is now completed\n")
        );

        let later = at("2024-03-04 09:00");
        let err =
            set_status(&mut Vec::new(), id.as_str(), "no_show", &s.config, later).unwrap_err();
        assert!(err.to_string().contains("locked"));

        let err =
            set_status(&mut Vec::new(), id.as_str(), "finished", &s.config, now).unwrap_err();
        assert!(err.to_string().contains("invalid session status"));
    }

    #[test]
    fn list_renders_table() {
        let s = setup();
        add(&mut Vec::new(), &add_args(&s, "09:00", "10:00"), &s.config).unwrap();
        let args = SessionListArgs {
            from: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            to: None,
            property: None,
            resident: None,
            worker: Some(s.worker.id.to_string()),
            support_type: None,
            status: Some("planned".to_string()),
            json: false,
        };
        let mut output = Vec::new();
        list(&mut output, &args, &s.config).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("09:00–10:00"));
        assert!(output.contains("Alex"));
        assert!(output.contains("Sam"));
        assert!(output.contains("personal_care"));
    }

    #[test]
    fn delete_removes_session() {
        let s = setup();
        add(&mut Vec::new(), &add_args(&s, "09:00", "10:00"), &s.config).unwrap();
        let id = stored_sessions(&s.config).remove(0).id;
        delete(&mut Vec::new(), id.as_str(), &s.config, at("2024-02-01 12:00")).unwrap();
        assert!(stored_sessions(&s.config).is_empty());

        let err =
            delete(&mut Vec::new(), id.as_str(), &s.config, at("2024-02-01 12:00")).unwrap_err();
        assert!(err.to_string().contains("session not found"));
    }
}
