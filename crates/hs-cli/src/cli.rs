//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::calendar::CalendarArgs;
use crate::commands::export::ExportArgs;
use crate::commands::property::PropertyAction;
use crate::commands::report::ReportArgs;
use crate::commands::resident::ResidentAction;
use crate::commands::session::SessionAction;
use crate::commands::worker::WorkerAction;

/// Support session scheduling for supported housing.
///
/// Keeps properties, residents and support workers, books support sessions
/// without double-booking workers, and reports allocated against delivered
/// hours.
#[derive(Debug, Parser)]
#[command(name = "hs", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage properties.
    #[command(subcommand)]
    Property(PropertyAction),

    /// Manage residents.
    #[command(subcommand)]
    Resident(ResidentAction),

    /// Manage support workers.
    #[command(subcommand)]
    Worker(WorkerAction),

    /// Book, change and list support sessions.
    #[command(subcommand)]
    Session(SessionAction),

    /// Show sessions on a monthly, weekly or daily calendar.
    Calendar(CalendarArgs),

    /// Show the monthly utilization summary.
    Report(ReportArgs),

    /// Export the monthly resident utilization table as CSV.
    Export(ExportArgs),
}
