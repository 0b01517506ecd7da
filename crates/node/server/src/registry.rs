//! The registry actor: single owner of the peer registry.
//!
//! New peers, departures and commands arrive on three channels and are processed one at a time
//! by [`RegistryActor::run`]. Peers and departures queued before a command are applied before
//! that command is served, so a connect reply is always visible to the next `ListPeers`.

use std::sync::Arc;

use ember_net_peer_registry::{InsertResult, OutPoint, PeerId, PeerRegistry, RegistryError};
use ember_net_transport::NodeAddress;
use ember_tasks::GracefulShutdown;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::{Command, ConnectError, Peer, server::Shared};

pub(crate) struct RegistryActor {
    registry: PeerRegistry<Peer>,
    new_peers: mpsc::Receiver<Peer>,
    departures: mpsc::UnboundedReceiver<PeerId>,
    commands: mpsc::Receiver<Command>,
    shared: Arc<Shared>,
}

impl RegistryActor {
    pub(crate) fn new(
        new_peers: mpsc::Receiver<Peer>,
        departures: mpsc::UnboundedReceiver<PeerId>,
        commands: mpsc::Receiver<Command>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            registry: PeerRegistry::new(),
            new_peers,
            departures,
            commands,
            shared,
        }
    }

    pub(crate) async fn run(mut self, mut shutdown: GracefulShutdown) {
        debug!("registry actor started");
        let guard = loop {
            // Arrivals and departures drain before commands, so a peer published before a command
            // is visible to it. A command waits out a burst of churn, which is bounded: each peer
            // yields one arrival and one departure, and arrivals queue behind `peer_buffer`.
            tokio::select! {
                biased;
                guard = &mut shutdown => break guard,
                Some(peer) = self.new_peers.recv() => self.add_peer(peer),
                Some(id) = self.departures.recv() => self.remove_peer(id),
                Some(command) = self.commands.recv() => self.handle_command(command),
            }
        };
        self.drain();
        debug!("registry actor stopped");
        drop(guard);
    }

    fn add_peer(&mut self, peer: Peer) {
        if self.shared.lifecycle.is_stopping() {
            trace!(peer = %peer.id(), "rejecting peer during teardown");
            peer.stop();
            return;
        }
        // gone before we got to it; its departure may already have been handled
        if peer.is_stopped() {
            return;
        }

        peer.mark_running();
        let (id, address, direction) = (peer.id(), peer.address().clone(), peer.direction());
        match self.registry.insert(peer) {
            InsertResult::New => {
                self.shared.metrics.peers_added.increment(1);
                self.update_gauge();
                debug!(peer = %id, %address, %direction, "peer registered");
            }
            InsertResult::DuplicateId(peer) => {
                warn!(peer = %id, "peer id already registered");
                peer.stop();
            }
        }
    }

    fn remove_peer(&mut self, id: PeerId) {
        if self.shared.lifecycle.is_stopping() {
            // the whole map is drained at shutdown
            if let Some(peer) = self.registry.get(&id) {
                peer.stop();
            }
            return;
        }
        if let Some(peer) = self.registry.remove(&id) {
            peer.stop();
            self.shared.metrics.peers_removed.increment(1);
            self.update_gauge();
            debug!(peer = %id, address = %peer.address(), "peer removed");
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::ConnectPeer { address, reply } => self.connect_peer(address, reply),
            Command::ListPeers { reply } => {
                let _ = reply.send(self.registry.peers().map(Peer::summary).collect());
            }
            Command::DisconnectPeer { id, reply } => {
                let result = if self.registry.contains(&id) {
                    self.remove_peer(id);
                    Ok(())
                } else {
                    Err(RegistryError::UnknownPeer(id))
                };
                let _ = reply.send(result);
            }
            Command::IndexChannel { outpoint, id, reply } => {
                let _ = reply.send(self.index_channel(outpoint, id));
            }
            Command::PeerForChannel { outpoint, reply } => {
                let _ = reply.send(self.registry.channel_peer(&outpoint).map(Peer::summary));
            }
        }
    }

    fn connect_peer(
        &mut self,
        address: NodeAddress,
        reply: oneshot::Sender<Result<PeerId, ConnectError>>,
    ) {
        if self.shared.lifecycle.is_stopping() {
            let _ = reply.send(Err(ConnectError::ShuttingDown));
            return;
        }
        // first match wins; exactly one reply either way
        if let Some(existing) = self.registry.find(address.identity()) {
            debug!(%address, peer = %existing.id(), "already connected");
            let _ = reply.send(Err(ConnectError::AlreadyConnected(address)));
            return;
        }

        let shared = Arc::clone(&self.shared);
        self.shared
            .executor
            .spawn_with_graceful_shutdown_signal("dialer", move |shutdown| async move {
                let result = shared.connect(address, shutdown.signal()).await;
                let _ = reply.send(result);
                drop(shutdown);
            });
    }

    fn index_channel(
        &mut self,
        outpoint: OutPoint,
        id: PeerId,
    ) -> Result<Option<PeerId>, RegistryError> {
        let previous = self.registry.index_channel(outpoint, id)?;
        if let Some(previous) = previous {
            debug!(%outpoint, from = %previous, to = %id, "channel moved to another peer");
        }
        Ok(previous)
    }

    fn update_gauge(&self) {
        self.shared.metrics.peers.set(self.registry.len() as f64);
    }

    /// Stop every peer the actor still holds or could still receive.
    fn drain(&mut self) {
        self.new_peers.close();
        while let Ok(peer) = self.new_peers.try_recv() {
            peer.stop();
        }
        let mut drained = 0usize;
        for peer in self.registry.drain() {
            peer.stop();
            drained += 1;
        }
        // pending requests see their reply channel dropped
        self.commands.close();
        while self.commands.try_recv().is_ok() {}

        self.shared.metrics.peers.set(0.0);
        debug!(peers = drained, "registry drained");
    }
}
