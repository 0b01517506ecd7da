//! Node command - run the connection server.
//!
//! - loads configuration from defaults, env, config file, and CLI
//! - unlocks the identity key from the keystore (or creates an ephemeral one)
//! - binds the TCP listeners and starts the server
//! - dials the configured peers
//! - runs until Ctrl+C or a critical task failure, then tears the server down

use crate::{cli::NodeArgs, config::NodeConfig};
use ember_net_transport::{IdentityKey, NodeAddress, TcpTransport};
use ember_node_api::{
    ChannelDatabase, MemoryChannelDb, MemoryWallet, NoopFundingManager, NoopRpcService, Wallet,
};
use ember_node_core::{
    chandb::FileChannelDb,
    dirs::DataDirs,
    keystore::{FileKeystore, KeystoreWallet, resolve_password},
};
use ember_node_server::{Collaborators, Server, ServerHandle};
use eyre::{OptionExt, Result, WrapErr};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Run the node command.
pub async fn run(args: NodeArgs) -> Result<()> {
    let dirs = DataDirs::new(&args.datadir)?;
    info!(path = %dirs.root.display(), "data directory");

    let config_path = dirs.config_file();
    let config = NodeConfig::load(Some(&config_path), &args.network, &args.identity)?;
    log_node_config(&config);

    let (wallet, channel_db) = open_identity(&config, args.identity.password.as_deref(), &dirs)?;
    let collaborators = Collaborators {
        wallet,
        channel_db,
        funding: Arc::new(NoopFundingManager),
        rpc: Arc::new(NoopRpcService),
    };

    let transport = Arc::new(TcpTransport::new(config.handshake_timeout()));
    let server = Server::new(config.server_config(), collaborators, transport)
        .await
        .wrap_err("failed to build server")?;

    if let Err(err) = server.start().await {
        if let Err(teardown) = server.stop().await {
            warn!(%teardown, "teardown after failed start");
        }
        return Err(err).wrap_err("failed to start server");
    }
    for addr in server.local_addrs() {
        info!(%addr, "accepting peers");
    }

    connect_peers(&server.handle(), &config.network.connect);

    info!("node running (press Ctrl+C to stop)");
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("received shutdown signal"),
            Err(err) => error!(%err, "failed to listen for shutdown signal"),
        },
        err = server.critical_failure() => error!(%err, "critical task failed"),
    }

    match server.stop().await {
        Ok(_) => {
            info!("node shutdown complete");
            Ok(())
        }
        Err(err) => {
            for step in err.errors() {
                error!(%step, "teardown step failed");
            }
            Err(err).wrap_err("node shutdown finished with errors")
        }
    }
}

/// Build the wallet and channel database the server derives its identity from.
fn open_identity(
    config: &NodeConfig,
    password: Option<&str>,
    dirs: &DataDirs,
) -> Result<(Arc<dyn Wallet>, Arc<dyn ChannelDatabase>)> {
    if config.identity.ephemeral {
        debug!("creating ephemeral identity");
        let wallet = MemoryWallet::new();
        let address = wallet.insert(IdentityKey::random()?);
        return Ok((Arc::new(wallet), Arc::new(MemoryChannelDb::new(address))));
    }

    let keys_dir = config.identity.keystore_dir.clone().unwrap_or_else(|| dirs.keys_dir());
    let password =
        resolve_password(password, config.identity.password_file.as_deref(), &dirs.password_file())?;
    let wallet = KeystoreWallet::open(&FileKeystore::new(keys_dir), &password)?;

    let channel_db = FileChannelDb::open(dirs.channel_db_file())?;
    let address = wallet.addresses().into_iter().next().ok_or_eyre("keystore holds no key")?;
    let recorded = channel_db.init_identity(address)?;
    if recorded != address {
        warn!(%recorded, keystore = %address, "channel database belongs to another identity");
    }

    Ok((Arc::new(wallet), Arc::new(channel_db)))
}

/// Dial each configured peer in the background.
fn connect_peers(handle: &ServerHandle, peers: &[NodeAddress]) {
    if peers.is_empty() {
        return;
    }
    info!(count = peers.len(), "connecting to configured peers");

    for address in peers.iter().cloned() {
        let handle = handle.clone();
        tokio::spawn(async move {
            let response = handle.connect_peer_response(address.clone()).await;
            match response.error {
                None => info!(peer = response.peer_id, %address, "connected to peer"),
                Some(err) => warn!(%address, %err, "failed to connect to peer"),
            }
        });
    }
}

fn log_node_config(config: &NodeConfig) {
    info!("Network configuration:");
    info!("  Listen: {}", config.network.listen.join(", "));
    info!("  Connect: {} peer(s)", config.network.connect.len());
    info!("  Max concurrent dials: {}", config.network.max_concurrent_dials);
    info!("  Dial timeout: {}s", config.network.dial_timeout_secs);
    info!("  Handshake timeout: {}s", config.network.handshake_timeout_secs);
    info!("Identity: {}", if config.identity.ephemeral { "ephemeral" } else { "keystore" });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{DataDirArgs, IdentityArgs, NetworkArgs};

    fn dirs_in(root: &std::path::Path) -> DataDirs {
        DataDirs::new(&DataDirArgs { datadir: Some(root.to_path_buf()) }).unwrap()
    }

    fn load(ephemeral: bool) -> NodeConfig {
        let identity = IdentityArgs { ephemeral, ..Default::default() };
        NodeConfig::load(None, &NetworkArgs::default(), &identity).unwrap()
    }

    #[test]
    fn test_persistent_identity_is_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = dirs_in(tmp.path());
        let config = load(false);

        let (_, first) = open_identity(&config, None, &dirs).unwrap();
        let first = first.identity_address().unwrap();
        assert!(dirs.password_file().exists());
        assert!(dirs.channel_db_file().exists());

        let (wallet, second) = open_identity(&config, None, &dirs).unwrap();
        assert_eq!(second.identity_address().unwrap(), first);
        assert!(wallet.managed_key(&first).is_ok());
    }

    #[test]
    fn test_ephemeral_identity_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = dirs_in(tmp.path());

        let (wallet, channel_db) = open_identity(&load(true), None, &dirs).unwrap();
        let address = channel_db.identity_address().unwrap();
        assert!(wallet.managed_key(&address).is_ok());
        assert!(!dirs.keys_dir().exists());
        assert!(!dirs.password_file().exists());
    }
}
