//! CSV export of the monthly resident utilization table.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use hs_core::report::{csv_filename, write_csv};

use super::open_database;
use super::report::{build_query, load_summary};
use crate::Config;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Year (defaults to the current year).
    #[arg(long)]
    pub year: Option<i32>,
    /// Month, 1-12 (defaults to the current month).
    #[arg(long)]
    pub month: Option<u32>,
    /// Only this property.
    #[arg(long)]
    pub property: Option<String>,
    /// Directory to write the CSV file into (defaults to the current directory).
    #[arg(long, conflicts_with = "stdout")]
    pub out_dir: Option<PathBuf>,
    /// Write the CSV to standard output instead of a file.
    #[arg(long)]
    pub stdout: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &ExportArgs, config: &Config) -> Result<()> {
    let today = Local::now().date_naive();
    let query = build_query(args.year, args.month, args.property.as_deref(), today)?;
    let db = open_database(config)?;
    let summary = load_summary(&db, &query)?;

    if args.stdout {
        write_csv(&summary.residents, &mut *writer)?;
        return Ok(());
    }

    let dir = args.out_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let path = dir.join(csv_filename(query.year, query.month));
    let file =
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(&summary.residents, BufWriter::new(file))
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        rows = summary.residents.len(),
        "exported monthly summary"
    );
    writeln!(writer, "Wrote {}", path.display())?;
    Ok(())
}
