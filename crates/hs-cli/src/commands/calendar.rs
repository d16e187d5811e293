//! Calendar command: month, week and day views of booked sessions.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Args, ValueEnum};
use hs_core::calendar::{DayGrid, MonthGrid, WeekGrid};
use hs_core::format::{format_duration_minutes, month_label};
use hs_core::{
    CalendarView, Grid, Navigation, PropertyId, Session, SessionFilter, SessionRepository,
    build_grid, minutes_of_day, parse_time,
};
use serde::Serialize;

use super::{Names, open_database, truncate};
use crate::Config;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ViewKind {
    #[default]
    Monthly,
    Weekly,
    Daily,
}

#[derive(Debug, Args)]
pub struct CalendarArgs {
    /// Which view to show.
    #[arg(long, value_enum, default_value_t = ViewKind::Monthly)]
    pub view: ViewKind,
    /// Year for the month view (defaults to the current year).
    #[arg(long)]
    pub year: Option<i32>,
    /// Month for the month view, 1-12 (defaults to the current month).
    #[arg(long)]
    pub month: Option<u32>,
    /// Anchor date; the week or day view is built around it (defaults to today).
    #[arg(long, visible_alias = "week")]
    pub date: Option<NaiveDate>,
    /// Only sessions at this property.
    #[arg(long)]
    pub property: Option<String>,
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &CalendarArgs, config: &Config) -> Result<()> {
    show(writer, args, config, Local::now().date_naive())
}

/// Calendar payload for `--json`.
#[derive(Debug, Serialize)]
struct CalendarOutput<'a> {
    view: CalendarView,
    navigation: Navigation,
    grid: &'a Grid,
}

fn show<W: Write>(
    writer: &mut W,
    args: &CalendarArgs,
    config: &Config,
    today: NaiveDate,
) -> Result<()> {
    let view = resolve_view(args, today)?;
    let mut filter = SessionFilter::all();
    if let Some(id) = &args.property {
        filter = filter.property(PropertyId::new(id.as_str())?);
    }

    let db = open_database(config)?;
    let (start, end) = view.date_range();
    let sessions = db.find_by_date_range(start, end, &filter)?;
    let grid = build_grid(&view, today, &sessions);

    if args.json {
        let output = CalendarOutput {
            view,
            navigation: view.navigation(),
            grid: &grid,
        };
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
        return Ok(());
    }

    let names = Names::load(&db)?;
    match &grid {
        Grid::Month(month) => render_month(writer, month, &names)?,
        Grid::Week(week) => render_week(writer, week, &names)?,
        Grid::Day(day) => render_day(writer, day, &names)?,
    }
    let navigation = view.navigation();
    writeln!(writer)?;
    writeln!(
        writer,
        "< {}  |  {} >",
        describe(&navigation.prev),
        describe(&navigation.next)
    )?;
    Ok(())
}

fn resolve_view(args: &CalendarArgs, today: NaiveDate) -> Result<CalendarView> {
    let anchor = args.date.unwrap_or(today);
    let view = match args.view {
        ViewKind::Monthly => CalendarView::monthly(
            args.year.unwrap_or_else(|| anchor.year()),
            args.month.unwrap_or_else(|| anchor.month()),
        )?,
        ViewKind::Weekly | ViewKind::Daily if args.year.is_some() || args.month.is_some() => {
            bail!("--year and --month only apply to the monthly view; use --date")
        }
        ViewKind::Weekly => CalendarView::weekly(anchor),
        ViewKind::Daily => CalendarView::daily(anchor),
    };
    Ok(view)
}

fn describe(view: &CalendarView) -> String {
    match *view {
        CalendarView::Monthly { year, month } => month_label(year, month),
        CalendarView::Weekly { week_start } => format!("week of {week_start}"),
        CalendarView::Daily { date } => date.format("%a %Y-%m-%d").to_string(),
    }
}

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const CELL_WIDTH: usize = 9;

fn render_month<W: Write>(writer: &mut W, grid: &MonthGrid, names: &Names) -> Result<()> {
    writeln!(writer, "{}", month_label(grid.year, grid.month))?;
    writeln!(writer)?;
    let header: Vec<String> = WEEKDAYS.iter().map(|d| format!("{d:<CELL_WIDTH$}")).collect();
    writeln!(writer, "{}", header.concat().trim_end())?;

    for week in &grid.weeks {
        let row: Vec<String> = week
            .iter()
            .map(|cell| {
                let mut text = if cell.is_current_month {
                    format!("{:>2}", cell.date.day())
                } else {
                    " .".to_string()
                };
                if cell.is_today {
                    text.push('*');
                }
                if !cell.sessions.is_empty() {
                    text.push_str(&format!(" ({})", cell.sessions.len()));
                }
                format!("{text:<CELL_WIDTH$}")
            })
            .collect();
        writeln!(writer, "{}", row.concat().trim_end())?;
    }

    let sessions: Vec<&Session> = grid
        .weeks
        .iter()
        .flatten()
        .filter(|cell| cell.is_current_month)
        .flat_map(|cell| &cell.sessions)
        .collect();
    writeln!(writer)?;
    if sessions.is_empty() {
        writeln!(writer, "No sessions this month.")?;
        return Ok(());
    }
    for session in sessions {
        write_session_line(writer, session, names, true)?;
    }
    Ok(())
}

fn render_week<W: Write>(writer: &mut W, grid: &WeekGrid, names: &Names) -> Result<()> {
    writeln!(writer, "Week of {}", grid.week_start)?;
    writeln!(writer)?;

    let mut header = format!("{:<7}", "");
    for (cell, weekday) in grid.days.iter().zip(WEEKDAYS) {
        let marker = if cell.is_today { "*" } else { "" };
        header.push_str(&format!("{:<12}", format!("{weekday} {}{marker}", cell.date.day())));
    }
    writeln!(writer, "{}", header.trim_end())?;

    for slot in &grid.time_slots {
        let minute = parse_time(slot, "slot").map(minutes_of_day)?;
        let mut line = format!("{slot:<7}");
        for cell in &grid.days {
            let occupant = cell
                .sessions
                .iter()
                .find(|s| s.interval.start_minute() <= minute && minute < s.interval.end_minute())
                .map_or_else(|| ".".to_string(), |s| truncate(names.resident(&s.resident_id), 10));
            line.push_str(&format!("{occupant:<12}"));
        }
        writeln!(writer, "{}", line.trim_end())?;
    }

    writeln!(writer)?;
    let mut any = false;
    for session in grid.days.iter().flat_map(|cell| &cell.sessions) {
        write_session_line(writer, session, names, true)?;
        any = true;
    }
    if !any {
        writeln!(writer, "No sessions this week.")?;
    }
    Ok(())
}

fn render_day<W: Write>(writer: &mut W, grid: &DayGrid, names: &Names) -> Result<()> {
    let marker = if grid.is_today { " (today)" } else { "" };
    writeln!(writer, "{}{marker}", grid.date.format("%A %Y-%m-%d"))?;
    writeln!(writer)?;

    let hours = grid
        .hours
        .iter()
        .map(|label| {
            let minute = parse_time(label, "hour").map(minutes_of_day)?;
            Ok::<_, anyhow::Error>((label, minute / 60))
        })
        .collect::<Result<Vec<_>>>()?;
    for &(label, hour) in &hours {
        writeln!(writer, "{label}")?;
        for session in grid
            .sessions
            .iter()
            .filter(|s| s.interval.start_minute() / 60 == hour)
        {
            write!(writer, "    ")?;
            write_session_line(writer, session, names, false)?;
        }
    }

    let outside: Vec<&Session> = grid
        .sessions
        .iter()
        .filter(|s| !hours.iter().any(|&(_, hour)| s.interval.start_minute() / 60 == hour))
        .collect();
    if !outside.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Outside the day grid:")?;
        for session in outside {
            write!(writer, "    ")?;
            write_session_line(writer, session, names, false)?;
        }
    }
    if grid.sessions.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "No sessions this day.")?;
    }
    Ok(())
}

fn write_session_line<W: Write>(
    writer: &mut W,
    session: &Session,
    names: &Names,
    with_date: bool,
) -> Result<()> {
    if with_date {
        write!(writer, "{}  ", session.session_date)?;
    }
    writeln!(
        writer,
        "{}  {} with {}  {} ({}, {})",
        session.interval,
        names.resident(&session.resident_id),
        names.worker(&session.support_worker_id),
        session.support_type,
        format_duration_minutes(session.duration_minutes()),
        session.status
    )?;
    Ok(())
}
