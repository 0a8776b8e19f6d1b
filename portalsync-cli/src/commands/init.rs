//! `portalsync init [--config <path>] [--force]`

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use portalsync_core::settings;

use super::ConfigArg;

/// Write a starter settings file.
#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Overwrite an existing settings file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<ExitCode> {
        let path = &self.config.config;
        if path.exists() && !self.force {
            println!(
                "Settings file already exists at {} (use --force to overwrite)",
                path.display()
            );
            return Ok(ExitCode::SUCCESS);
        }

        let written = settings::init_at(path, self.force)
            .with_context(|| format!("failed to write settings to {}", path.display()))?;

        println!("✓ Wrote settings to {}", path.display());
        println!(
            "  {} example services, {} example tasks; the password is obfuscated on first run",
            written.services.len(),
            written.tasks().len()
        );
        Ok(ExitCode::SUCCESS)
    }
}
