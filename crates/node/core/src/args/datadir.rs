//! Data directory CLI arguments.

use clap::Args;
use std::path::PathBuf;

/// Data directory configuration.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq)]
#[command(next_help_heading = "Datadir")]
pub struct DataDirArgs {
    /// Data directory for all node data (config, keys, channel database).
    #[arg(long, value_name = "PATH", env = "EMBER_DATADIR")]
    pub datadir: Option<PathBuf>,
}
