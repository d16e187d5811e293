//! Support worker commands: add, list and deactivate.

use std::collections::BTreeSet;
use std::io::Write;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use hs_core::format::format_hours;
use hs_core::{Roster, SupportType, SupportWorker, WorkerId};

use super::{open_database, truncate};
use crate::Config;

#[derive(Debug, Subcommand)]
pub enum WorkerAction {
    /// Add a support worker.
    Add(WorkerAddArgs),
    /// List support workers.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Mark a worker inactive. They can no longer take new sessions.
    Deactivate {
        /// Worker ID.
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct WorkerAddArgs {
    /// Worker name.
    #[arg(long)]
    pub name: String,
    /// Contracted hours per week.
    #[arg(long)]
    pub weekly_hours: f64,
    /// Contracted hours per month.
    #[arg(long)]
    pub monthly_hours: f64,
    /// Support types the worker specializes in (repeatable).
    #[arg(long = "specialization")]
    pub specializations: Vec<String>,
}

pub fn run<W: Write>(writer: &mut W, action: &WorkerAction, config: &Config) -> Result<()> {
    match action {
        WorkerAction::Add(args) => add(writer, args, config),
        WorkerAction::List { json } => list(writer, *json, config),
        WorkerAction::Deactivate { id } => deactivate(writer, id, config),
    }
}

fn add<W: Write>(writer: &mut W, args: &WorkerAddArgs, config: &Config) -> Result<()> {
    let specializations = args
        .specializations
        .iter()
        .map(|s| s.parse::<SupportType>())
        .collect::<Result<BTreeSet<_>, _>>()?;
    let worker = SupportWorker::new(
        &args.name,
        args.weekly_hours,
        args.monthly_hours,
        specializations,
    )?;

    let mut db = open_database(config)?;
    db.insert_worker(&worker)?;
    tracing::info!(worker = %worker.id, "support worker added");
    writeln!(writer, "Added support worker {} ({})", worker.name, worker.id)?;
    Ok(())
}

fn list<W: Write>(writer: &mut W, json: bool, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let workers = db.list_workers()?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&workers)?)?;
        return Ok(());
    }
    if workers.is_empty() {
        writeln!(writer, "No support workers yet.")?;
        return Ok(());
    }

    writeln!(
        writer,
        "{:<36}  {:<20}  {:>6}  {:>6}  {:<8}  Specializations",
        "ID", "Name", "Week", "Month", "Status"
    )?;
    for worker in &workers {
        let specializations: Vec<&str> =
            worker.specializations.iter().map(SupportType::as_str).collect();
        writeln!(
            writer,
            "{:<36}  {:<20}  {:>6}  {:>6}  {:<8}  {}",
            worker.id,
            truncate(&worker.name, 20),
            format_hours(worker.max_hours_per_week),
            format_hours(worker.max_hours_per_month),
            if worker.is_active { "active" } else { "inactive" },
            specializations.join(", ")
        )?;
    }
    Ok(())
}

fn deactivate<W: Write>(writer: &mut W, id: &str, config: &Config) -> Result<()> {
    let id = WorkerId::new(id)?;
    let mut db = open_database(config)?;
    let Some(mut worker) = db.find_worker(&id)? else {
        bail!("support worker not found: {id}");
    };
    worker.is_active = false;
    db.update_worker(&worker)?;
    tracing::info!(worker = %id, "support worker deactivated");
    writeln!(writer, "Deactivated support worker {}", worker.name)?;
    Ok(())
}
