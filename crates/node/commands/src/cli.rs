//! CLI argument assembly and top-level parser.

use clap::{Args, Parser, Subcommand};

pub use ember_node_core::args::{DataDirArgs, IdentityArgs, LogArgs, NetworkArgs};

/// ember - Lightning node connection server
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub logs: LogArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a node.
    Node(Box<NodeArgs>),
}

/// Arguments for the `node` command.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq)]
pub struct NodeArgs {
    #[command(flatten)]
    pub datadir: DataDirArgs,

    #[command(flatten)]
    pub network: NetworkArgs,

    #[command(flatten)]
    pub identity: IdentityArgs,
}
