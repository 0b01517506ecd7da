//! CLI commands for the ember node.
//!
//! - [`Cli`] - top-level CLI parser
//! - [`Commands`] - available subcommands
//! - [`NodeArgs`] - arguments of the node command
//!
//! Configuration is loaded using Figment with the following priority (highest wins):
//!
//! 1. CLI arguments
//! 2. Config file (`{datadir}/config.toml`)
//! 3. Environment variables (`EMBER_` prefix, `__` between nested keys)
//! 4. Defaults

mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands, NodeArgs};
pub use config::NodeConfig;

use clap::Parser;
use color_eyre::eyre;
use ember_node_core::{logging, version};
use tracing::info;

/// Parse the command line and run the selected command.
pub async fn run() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init_logging(&cli.logs)?;
    info!(version = version::VERSION, "starting ember");

    match cli.command {
        Commands::Node(args) => commands::node::run(*args).await?,
    }

    Ok(())
}
