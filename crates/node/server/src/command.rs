//! Requests served by the registry actor.
//!
//! Each [`Command`] carries its own single-use reply channel. [`ServerHandle`] wraps the send
//! and the wait for callers outside the server.

use ember_net_peer_registry::{OutPoint, PeerId, RegistryError};
use ember_net_transport::NodeAddress;
use tokio::sync::{mpsc, oneshot, watch};

use crate::{CommandError, ConnectError, LifecycleState, PeerSummary};

/// Peer id reported when a connect request fails.
pub const SENTINEL_PEER_ID: i64 = -1;

#[derive(Debug)]
pub enum Command {
    /// Connect to `address` unless a peer authenticated as it is already registered.
    ConnectPeer {
        address: NodeAddress,
        reply: oneshot::Sender<Result<PeerId, ConnectError>>,
    },
    /// Snapshot of the registered peers.
    ListPeers {
        reply: oneshot::Sender<Vec<PeerSummary>>,
    },
    /// Stop and deregister a peer.
    DisconnectPeer {
        id: PeerId,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    /// Route a funded channel to the peer that owns it.
    IndexChannel {
        outpoint: OutPoint,
        id: PeerId,
        reply: oneshot::Sender<Result<Option<PeerId>, RegistryError>>,
    },
    /// Resolve a funded channel to its peer.
    PeerForChannel {
        outpoint: OutPoint,
        reply: oneshot::Sender<Option<PeerSummary>>,
    },
}

/// Outcome of a connect request in the shape external APIs report it: an id, or
/// [`SENTINEL_PEER_ID`] with an error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPeerResponse {
    pub peer_id: i64,
    pub error: Option<String>,
}

impl ConnectPeerResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<Result<PeerId, ConnectError>> for ConnectPeerResponse {
    fn from(result: Result<PeerId, ConnectError>) -> Self {
        match result {
            Ok(id) => Self {
                peer_id: id.into(),
                error: None,
            },
            Err(err) => Self {
                peer_id: SENTINEL_PEER_ID,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Cloneable entry point for querying and commanding a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    commands: mpsc::Sender<Command>,
    lifecycle: watch::Receiver<LifecycleState>,
}

impl ServerHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        lifecycle: watch::Receiver<LifecycleState>,
    ) -> Self {
        Self {
            commands,
            lifecycle,
        }
    }

    /// Submit a raw command. Fails if the server is not running.
    pub async fn send(&self, command: Command) -> Result<(), CommandError> {
        if *self.lifecycle.borrow() != LifecycleState::Running {
            return Err(CommandError::NotRunning);
        }
        self.commands.send(command).await.map_err(|_| CommandError::NotRunning)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx)).await?;
        rx.await.map_err(|_| CommandError::NotRunning)
    }

    pub async fn list_peers(&self) -> Result<Vec<PeerSummary>, CommandError> {
        self.request(|reply| Command::ListPeers { reply }).await
    }

    /// Connect to `address`. Resolves once the dial finished or the request was rejected.
    pub async fn connect_peer(&self, address: NodeAddress) -> Result<PeerId, ConnectError> {
        match self.request(|reply| Command::ConnectPeer { address, reply }).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::NotRunning),
        }
    }

    /// [`connect_peer`](Self::connect_peer) mapped to a [`ConnectPeerResponse`].
    pub async fn connect_peer_response(&self, address: NodeAddress) -> ConnectPeerResponse {
        self.connect_peer(address).await.into()
    }

    pub async fn disconnect_peer(&self, id: PeerId) -> Result<(), CommandError> {
        Ok(self.request(|reply| Command::DisconnectPeer { id, reply }).await??)
    }

    /// Returns the previous owner if the channel moved between peers.
    pub async fn index_channel(
        &self,
        outpoint: OutPoint,
        id: PeerId,
    ) -> Result<Option<PeerId>, CommandError> {
        Ok(self.request(|reply| Command::IndexChannel { outpoint, id, reply }).await??)
    }

    pub async fn peer_for_channel(
        &self,
        outpoint: OutPoint,
    ) -> Result<Option<PeerSummary>, CommandError> {
        self.request(|reply| Command::PeerForChannel { outpoint, reply }).await
    }
}
