//! Established peers.
//!
//! A [`Peer`] wraps one authenticated connection. Starting it spawns a reader and a writer task
//! on the server's executor; both end when the peer is stopped, when the connection fails, or
//! when the server shuts down. The reader reports the departure exactly once when it exits.

use std::sync::Arc;

use bytes::Bytes;
use ember_net_peer_registry::{Direction, PeerId, RegisteredPeer};
use ember_net_transport::{AuthenticatedConnection, BoxedStream, NodeAddress, PublicKey};
use ember_tasks::TaskExecutor;
use parking_lot::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{mpsc, watch},
};
use tracing::{debug, trace};

const READ_BUFFER: usize = 16 * 1024;

/// Messages queued for the writer before [`Peer::send`] waits.
const OUTBOUND_BUFFER: usize = 64;

/// Lifecycle of a single peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PeerState {
    Created,
    /// Reader and writer tasks are running.
    Started,
    /// Registered with the server.
    Running,
    Stopped,
}

/// Point-in-time description of a registered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    pub id: PeerId,
    pub public_key: PublicKey,
    pub address: NodeAddress,
    pub direction: Direction,
}

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("peer {0} is stopped")]
    Stopped(PeerId),
}

#[derive(Debug)]
struct PeerShared {
    state: Mutex<PeerState>,
    stop: watch::Sender<bool>,
}

impl PeerShared {
    fn stop(&self) -> bool {
        *self.state.lock() = PeerState::Stopped;
        !self.stop.send_replace(true)
    }
}

/// One authenticated connection to a remote node.
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    public_key: PublicKey,
    address: NodeAddress,
    direction: Direction,
    shared: Arc<PeerShared>,
    outbound: mpsc::Sender<Bytes>,
    pending: Option<(AuthenticatedConnection, mpsc::Receiver<Bytes>)>,
}

impl Peer {
    pub fn new(id: PeerId, conn: AuthenticatedConnection, direction: Direction) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        Self {
            id,
            public_key: *conn.remote_key(),
            address: conn.remote_address(),
            direction,
            shared: Arc::new(PeerShared {
                state: Mutex::new(PeerState::Created),
                stop: watch::Sender::new(false),
            }),
            outbound,
            pending: Some((conn, outbound_rx)),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> PeerState {
        *self.shared.state.lock()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == PeerState::Stopped
    }

    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            id: self.id,
            public_key: self.public_key,
            address: self.address.clone(),
            direction: self.direction,
        }
    }

    /// Spawn the reader and writer tasks. Returns `false` if the peer was already started or
    /// stopped.
    ///
    /// `departures` receives this peer's id once the connection is gone.
    pub fn start(
        &mut self,
        executor: &TaskExecutor,
        departures: mpsc::UnboundedSender<PeerId>,
    ) -> bool {
        {
            let mut state = self.shared.state.lock();
            if *state != PeerState::Created {
                return false;
            }
            *state = PeerState::Started;
        }
        let Some((conn, outbound_rx)) = self.pending.take() else {
            return false;
        };
        let (reader, writer) = conn.into_split();

        let (id, shared) = (self.id, Arc::clone(&self.shared));
        executor.spawn_with_graceful_shutdown_signal("peer-reader", move |shutdown| async move {
            let mut shutdown = shutdown;
            let guard = tokio::select! {
                guard = &mut shutdown => Some(guard),
                () = read_loop(id, reader, shared.stop.subscribe()) => None,
            };
            if shared.stop() {
                debug!(peer = %id, "peer disconnected");
            }
            let _ = departures.send(id);
            drop(guard);
        });

        let (id, shared) = (self.id, Arc::clone(&self.shared));
        executor.spawn_with_graceful_shutdown_signal("peer-writer", move |shutdown| async move {
            let mut shutdown = shutdown;
            let guard = tokio::select! {
                guard = &mut shutdown => Some(guard),
                () = write_loop(id, writer, outbound_rx, shared.stop.subscribe()) => None,
            };
            shared.stop();
            drop(guard);
        });

        trace!(peer = %self.id, address = %self.address, "peer started");
        true
    }

    /// Mark the peer as registered. No-op unless it is started.
    pub(crate) fn mark_running(&self) {
        let mut state = self.shared.state.lock();
        if *state == PeerState::Started {
            *state = PeerState::Running;
        }
    }

    /// Stop the peer's tasks, closing the connection. Idempotent.
    pub fn stop(&self) {
        if self.shared.stop() {
            trace!(peer = %self.id, "peer stopped");
        }
    }

    /// Queue `msg` for the writer.
    pub async fn send(&self, msg: Bytes) -> Result<(), PeerError> {
        if self.is_stopped() {
            return Err(PeerError::Stopped(self.id));
        }
        self.outbound.send(msg).await.map_err(|_| PeerError::Stopped(self.id))
    }
}

impl RegisteredPeer for Peer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

async fn wait_stopped(mut stop: watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn read_loop(id: PeerId, mut reader: ReadHalf<BoxedStream>, stop: watch::Receiver<bool>) {
    let mut buf = vec![0u8; READ_BUFFER];
    let mut stopped = std::pin::pin!(wait_stopped(stop));
    loop {
        tokio::select! {
            () = &mut stopped => return,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    trace!(peer = %id, "remote closed connection");
                    return;
                }
                Ok(n) => {
                    metrics::counter!("peer.bytes_received_total").increment(n as u64);
                }
                Err(err) => {
                    debug!(peer = %id, %err, "read failed");
                    return;
                }
            },
        }
    }
}

async fn write_loop(
    id: PeerId,
    mut writer: WriteHalf<BoxedStream>,
    mut outbound: mpsc::Receiver<Bytes>,
    stop: watch::Receiver<bool>,
) {
    let mut stopped = std::pin::pin!(wait_stopped(stop));
    loop {
        tokio::select! {
            () = &mut stopped => break,
            msg = outbound.recv() => {
                // every sender is gone with the peer handle
                let Some(msg) = msg else { break };
                let written = async {
                    writer.write_all(&msg).await?;
                    writer.flush().await
                };
                if let Err(err) = written.await {
                    debug!(peer = %id, %err, "write failed");
                    break;
                }
                metrics::counter!("peer.bytes_sent_total").increment(msg.len() as u64);
            }
        }
    }
    let _ = writer.shutdown().await;
}
