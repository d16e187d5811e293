//! Property commands: add, list and deactivate.

use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use hs_core::utilization::occupancy;
use hs_core::{Property, PropertyId, Roster};
use serde::Serialize;

use super::{open_database, truncate};
use crate::Config;

#[derive(Debug, Subcommand)]
pub enum PropertyAction {
    /// Add a property.
    Add(PropertyAddArgs),
    /// List properties with occupancy.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Mark a property inactive. Existing sessions are kept.
    Deactivate {
        /// Property ID.
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct PropertyAddArgs {
    /// Property name.
    #[arg(long)]
    pub name: String,
    /// Maximum number of residents.
    #[arg(long)]
    pub capacity: u32,
}

pub fn run<W: Write>(writer: &mut W, action: &PropertyAction, config: &Config) -> Result<()> {
    match action {
        PropertyAction::Add(args) => add(writer, args, config),
        PropertyAction::List { json } => list(writer, *json, config),
        PropertyAction::Deactivate { id } => deactivate(writer, id, config),
    }
}

fn add<W: Write>(writer: &mut W, args: &PropertyAddArgs, config: &Config) -> Result<()> {
    let property = Property::new(&args.name, args.capacity)?;
    let mut db = open_database(config)?;
    db.insert_property(&property)?;
    tracing::info!(property = %property.id, "property added");
    writeln!(writer, "Added property {} ({})", property.name, property.id)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct PropertyEntry {
    #[serde(flatten)]
    property: Property,
    current_residents: usize,
    occupancy_pct: f64,
}

fn list<W: Write>(writer: &mut W, json: bool, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let residents = db.list_residents()?;
    let entries: Vec<PropertyEntry> = db
        .list_properties()?
        .into_iter()
        .map(|property| {
            let record = occupancy(&property, &residents);
            PropertyEntry {
                property,
                current_residents: record.current_residents,
                occupancy_pct: record.occupancy_pct,
            }
        })
        .collect();

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }
    if entries.is_empty() {
        writeln!(writer, "No properties yet. Add one with 'hs property add'.")?;
        return Ok(());
    }

    writeln!(
        writer,
        "{:<36}  {:<22}  {:>9}  {:>9}  Status",
        "ID", "Name", "Residents", "Occupancy"
    )?;
    for entry in &entries {
        let p = &entry.property;
        writeln!(
            writer,
            "{:<36}  {:<22}  {:>9}  {:>8.1}%  {}",
            p.id,
            truncate(&p.name, 22),
            format!("{}/{}", entry.current_residents, p.max_capacity),
            entry.occupancy_pct,
            if p.is_active { "active" } else { "inactive" }
        )?;
    }
    Ok(())
}

fn deactivate<W: Write>(writer: &mut W, id: &str, config: &Config) -> Result<()> {
    let id = PropertyId::new(id)?;
    let mut db = open_database(config)?;
    let Some(mut property) = db.find_property(&id)? else {
        bail!("property not found: {id}");
    };
    property.is_active = false;
    db.update_property(&property)
        .with_context(|| format!("failed to update property {id}"))?;
    tracing::info!(property = %id, "property deactivated");
    writeln!(writer, "Deactivated property {}", property.name)?;
    Ok(())
}
