use ember_net_dialer::DialError;
use ember_net_peer_registry::RegistryError;
use ember_net_transport::{NodeAddress, TransportError};
use ember_node_api::{ChannelDbError, LifecycleError, WalletError};

/// Fatal error while constructing or starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to read identity address: {0}")]
    IdentityAddress(#[from] ChannelDbError),
    #[error("failed to retrieve identity key: {0}")]
    IdentityKey(#[from] WalletError),
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: TransportError,
    },
    #[error("failed to start funding manager: {0}")]
    Funding(#[source] LifecycleError),
}

/// Why a connect request produced no peer.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("already connected to peer: {0}")]
    AlreadyConnected(NodeAddress),
    #[error(transparent)]
    Dial(#[from] DialError),
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("server is not running")]
    NotRunning,
}

/// A command could not be served.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("server is not running")]
    NotRunning,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// One failed teardown step.
#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    #[error("closing listener {addr}: {source}")]
    Listener {
        addr: String,
        #[source]
        source: TransportError,
    },
    #[error("stopping rpc service: {0}")]
    Rpc(#[source] LifecycleError),
    #[error("stopping funding manager: {0}")]
    Funding(#[source] LifecycleError),
    #[error("shutting down wallet: {0}")]
    Wallet(#[source] WalletError),
}

/// Teardown ran to completion but some steps failed.
#[derive(Debug, thiserror::Error)]
#[error(
    "shutdown finished with errors: {}",
    .errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
)]
pub struct ShutdownError {
    errors: Vec<TeardownError>,
}

impl ShutdownError {
    pub(crate) fn new(errors: Vec<TeardownError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[TeardownError] {
        &self.errors
    }
}
