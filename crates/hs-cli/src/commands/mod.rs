//! CLI subcommand implementations.

pub mod calendar;
pub mod export;
pub mod property;
pub mod report;
pub mod resident;
pub mod session;
pub mod worker;

use std::collections::HashMap;

use anyhow::{Context, Result};
use hs_core::{ResidentId, Roster, WorkerId};
use hs_db::Database;

use crate::Config;

/// Opens the configured database, creating its directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// Resident and worker display names, keyed by ID.
#[derive(Debug, Default)]
pub struct Names {
    residents: HashMap<ResidentId, String>,
    workers: HashMap<WorkerId, String>,
}

impl Names {
    pub fn load(db: &Database) -> Result<Self> {
        let residents = db
            .list_residents()?
            .into_iter()
            .map(|r| (r.id, r.name))
            .collect();
        let workers = db
            .list_workers()?
            .into_iter()
            .map(|w| (w.id, w.name))
            .collect();
        Ok(Self { residents, workers })
    }

    pub fn resident<'a>(&'a self, id: &'a ResidentId) -> &'a str {
        self.residents.get(id).map_or(id.as_str(), String::as_str)
    }

    pub fn worker<'a>(&'a self, id: &'a WorkerId) -> &'a str {
        self.workers.get(id).map_or(id.as_str(), String::as_str)
    }
}

/// Truncates by characters, not bytes, to avoid panics on multi-byte UTF-8.
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let keep = width.saturating_sub(3);
        format!("{}...", text.chars().take(keep).collect::<String>())
    } else {
        text.to_string()
    }
}
