//! Figment-based configuration loading.
//!
//! Configuration priority (highest wins):
//! 1. CLI arguments
//! 2. Config file (TOML)
//! 3. Environment variables (`EMBER_` prefix)
//! 4. Defaults

use crate::cli::{IdentityArgs, NetworkArgs};
use ember_net_dialer::{DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_CONCURRENT_DIALS, DialerConfig};
use ember_net_transport::{DEFAULT_HANDSHAKE_TIMEOUT, NodeAddress};
use ember_node_server::{DEFAULT_PEER_BUFFER, ServerConfig};
use eyre::{Result, WrapErr};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Default peer-to-peer listen endpoint.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9735";

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub identity: IdentityConfig,
}

/// Listener, dialer and registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub listen: Vec<String>,
    /// Peers dialed once the server is running.
    pub connect: Vec<NodeAddress>,
    pub max_concurrent_dials: usize,
    pub dial_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub peer_buffer: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: vec![DEFAULT_LISTEN_ADDR.to_string()],
            connect: Vec::new(),
            max_concurrent_dials: DEFAULT_MAX_CONCURRENT_DIALS,
            dial_timeout_secs: DEFAULT_DIAL_TIMEOUT.as_secs(),
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
            peer_buffer: DEFAULT_PEER_BUFFER,
        }
    }
}

/// Where the identity key comes from. The password itself is never read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub ephemeral: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keystore_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
}

/// CLI values layered last; unset fields serialize to nothing.
#[derive(Serialize)]
struct CliOverrides<'a> {
    network: &'a NetworkArgs,
    identity: &'a IdentityArgs,
}

impl NodeConfig {
    /// Load configuration from defaults, environment, config file, and CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        network: &NetworkArgs,
        identity: &IdentityArgs,
    ) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(NodeConfig::default()))
            .merge(Env::prefixed("EMBER_").split("__"));

        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment
            .merge(Serialized::defaults(CliOverrides { network, identity }))
            .extract()
            .wrap_err("failed to load configuration")
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_addrs: self.network.listen.clone(),
            peer_buffer: self.network.peer_buffer,
            dialer: DialerConfig {
                max_concurrent_dials: self.network.max_concurrent_dials,
                dial_timeout: Duration::from_secs(self.network.dial_timeout_secs),
            },
            ..ServerConfig::default()
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.network.handshake_timeout_secs)
    }
}
