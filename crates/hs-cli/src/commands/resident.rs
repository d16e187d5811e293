//! Resident commands: add, list, move and deactivate.

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use hs_core::format::format_hours;
use hs_core::{PropertyId, Resident, ResidentId, Roster};

use super::{open_database, truncate};
use crate::Config;

#[derive(Debug, Subcommand)]
pub enum ResidentAction {
    /// Add a resident at a property.
    Add(ResidentAddArgs),
    /// List residents.
    List {
        /// Only residents at this property.
        #[arg(long)]
        property: Option<String>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Move a resident to another property.
    Move {
        /// Resident ID.
        id: String,
        /// Destination property ID.
        #[arg(long)]
        property: String,
    },
    /// Mark a resident as moved out.
    Deactivate {
        /// Resident ID.
        id: String,
        /// Last day of residency (defaults to none).
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
}

#[derive(Debug, Args)]
pub struct ResidentAddArgs {
    /// Resident name.
    #[arg(long)]
    pub name: String,
    /// Property ID.
    #[arg(long)]
    pub property: String,
    /// Support hours allocated per month.
    #[arg(long)]
    pub hours: f64,
    /// First day of residency (YYYY-MM-DD).
    #[arg(long)]
    pub start_date: NaiveDate,
}

pub fn run<W: Write>(writer: &mut W, action: &ResidentAction, config: &Config) -> Result<()> {
    match action {
        ResidentAction::Add(args) => add(writer, args, config),
        ResidentAction::List { property, json } => {
            list(writer, property.as_deref(), *json, config)
        }
        ResidentAction::Move { id, property } => move_to(writer, id, property, config),
        ResidentAction::Deactivate { id, end_date } => deactivate(writer, id, *end_date, config),
    }
}

fn add<W: Write>(writer: &mut W, args: &ResidentAddArgs, config: &Config) -> Result<()> {
    let property_id = PropertyId::new(args.property.as_str())?;
    let mut db = open_database(config)?;
    let Some(property) = db.find_property(&property_id)? else {
        bail!("property not found: {property_id}");
    };
    if !property.is_active {
        bail!("property {} is inactive", property.name);
    }

    let resident = Resident::new(&args.name, property_id, args.hours, args.start_date)?;
    db.insert_resident(&resident)?;
    tracing::info!(resident = %resident.id, property = %property.id, "resident added");
    writeln!(
        writer,
        "Added resident {} at {} ({})",
        resident.name, property.name, resident.id
    )?;
    Ok(())
}

fn list<W: Write>(
    writer: &mut W,
    property: Option<&str>,
    json: bool,
    config: &Config,
) -> Result<()> {
    let db = open_database(config)?;
    let property_names: HashMap<PropertyId, String> = db
        .list_properties()?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    let residents: Vec<Resident> = db
        .list_residents()?
        .into_iter()
        .filter(|r| property.is_none_or(|wanted| r.property_id.as_str() == wanted))
        .collect();

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&residents)?)?;
        return Ok(());
    }
    if residents.is_empty() {
        writeln!(writer, "No residents found.")?;
        return Ok(());
    }

    writeln!(
        writer,
        "{:<36}  {:<20}  {:<20}  {:>7}  Status",
        "ID", "Name", "Property", "Hours"
    )?;
    for resident in &residents {
        let property_name = property_names
            .get(&resident.property_id)
            .map_or(resident.property_id.as_str(), String::as_str);
        writeln!(
            writer,
            "{:<36}  {:<20}  {:<20}  {:>7}  {}",
            resident.id,
            truncate(&resident.name, 20),
            truncate(property_name, 20),
            format_hours(resident.monthly_support_hours),
            if resident.is_active { "active" } else { "moved out" }
        )?;
    }
    Ok(())
}

fn move_to<W: Write>(writer: &mut W, id: &str, property: &str, config: &Config) -> Result<()> {
    let id = ResidentId::new(id)?;
    let property_id = PropertyId::new(property)?;
    let mut db = open_database(config)?;
    let Some(mut resident) = db.find_resident(&id)? else {
        bail!("resident not found: {id}");
    };
    let Some(destination) = db.find_property(&property_id)? else {
        bail!("property not found: {property_id}");
    };
    if !destination.is_active {
        bail!("property {} is inactive", destination.name);
    }

    resident.property_id = property_id;
    db.update_resident(&resident)?;
    tracing::info!(resident = %id, property = %destination.id, "resident moved");
    writeln!(writer, "Moved {} to {}", resident.name, destination.name)?;
    Ok(())
}

fn deactivate<W: Write>(
    writer: &mut W,
    id: &str,
    end_date: Option<NaiveDate>,
    config: &Config,
) -> Result<()> {
    let id = ResidentId::new(id)?;
    let mut db = open_database(config)?;
    let Some(mut resident) = db.find_resident(&id)? else {
        bail!("resident not found: {id}");
    };
    resident.is_active = false;
    resident.end_date = end_date.or(resident.end_date);
    resident.validate()?;
    db.update_resident(&resident)?;
    tracing::info!(resident = %id, "resident deactivated");
    writeln!(writer, "Deactivated resident {}", resident.name)?;
    Ok(())
}
