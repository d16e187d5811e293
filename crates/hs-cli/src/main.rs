use std::io;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use hs_cli::commands::{calendar, export, property, report, resident, session, worker};
use hs_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so command output stays pipeable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();
    match command {
        Commands::Property(action) => property::run(&mut stdout, action, &config)?,
        Commands::Resident(action) => resident::run(&mut stdout, action, &config)?,
        Commands::Worker(action) => worker::run(&mut stdout, action, &config)?,
        Commands::Session(action) => session::run(&mut stdout, action, &config)?,
        Commands::Calendar(args) => calendar::run(&mut stdout, args, &config)?,
        Commands::Report(args) => report::run(&mut stdout, args, &config)?,
        Commands::Export(args) => export::run(&mut stdout, args, &config)?,
    }
    Ok(())
}
