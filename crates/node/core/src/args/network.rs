//! Networking CLI arguments.

use clap::Args;
use ember_net_transport::NodeAddress;
use serde::Serialize;

/// Listener, dialer and registry settings.
///
/// Unset values fall through to the configuration file, then the environment, then defaults.
#[derive(Debug, Clone, Default, Args, PartialEq, Eq, Serialize)]
#[command(next_help_heading = "Networking")]
pub struct NetworkArgs {
    /// Comma separated `host:port` endpoints to accept peers on.
    #[arg(long, value_name = "ADDR", value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub listen: Vec<String>,

    /// Comma separated peers to connect to at startup.
    ///
    /// --connect 02ab..ef@10.0.0.1:9735
    #[arg(long, value_name = "IDENTITY@ADDR", value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connect: Vec<NodeAddress>,

    /// Outbound dials allowed to run at once.
    #[arg(long = "max-concurrent-dials", value_name = "COUNT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_dials: Option<usize>,

    /// Seconds before an outbound dial is abandoned.
    #[arg(long = "dial-timeout", value_name = "SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dial_timeout_secs: Option<u64>,

    /// Seconds allowed for the identity handshake on a new TCP connection.
    #[arg(long = "handshake-timeout", value_name = "SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake_timeout_secs: Option<u64>,

    /// New peers that may queue for registration before accept loops wait.
    #[arg(long = "peer-buffer", value_name = "COUNT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_buffer: Option<usize>,
}
