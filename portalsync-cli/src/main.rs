//! portalsync: publish GIS projects to a portal on a schedule.
//!
//! # Usage
//!
//! ```text
//! portalsync run [--config <path>] [--log-file <path>] [--staging <dir>] [--strict]
//! portalsync status [--config <path>] [--json]
//! portalsync init [--config <path>] [--force]
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, run::RunArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "portalsync",
    version,
    about = "Republish GIS services to a portal and sweep out stale content",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish every due service, run retention tasks, and save sync dates.
    Run(RunArgs),

    /// Show which services and tasks are due today.
    Status(StatusArgs),

    /// Write a starter settings file.
    Init(InitArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Init(args) => args.run(),
    }
}

/// Diagnostics go to stderr so `--json` output stays parseable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
