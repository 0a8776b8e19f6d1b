pub mod init;
pub mod run;
pub mod status;

use std::path::PathBuf;

use clap::Args;

use portalsync_core::settings::DEFAULT_CONFIG_FILE;

/// Location of the settings document, shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Path to the settings file.
    #[arg(long, short = 'c', value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}
