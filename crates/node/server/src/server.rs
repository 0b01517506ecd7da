//! The connection server and its start/stop orchestration.

use std::{
    future::{Future, pending, poll_fn},
    pin::Pin,
    sync::Arc,
};

use ember_net_dialer::Dialer;
use ember_net_peer_registry::{Direction, PeerId, PeerIdGenerator};
use ember_net_transport::{AuthenticatedConnection, IdentityKey, Listener, NodeAddress, Transport};
use ember_node_api::{ChannelDatabase, FundingManager, RpcService, Wallet};
use ember_tasks::{PanickedTaskError, Shutdown, TaskExecutor, TaskManager};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    Command, ConnectError, LifecycleState, Peer, ServerConfig, ServerError, ServerHandle,
    ShutdownError, TeardownError,
    lifecycle::Lifecycle,
    listener::accept_loop,
    metrics::ServerMetrics,
    registry::RegistryActor,
};

/// External services the server starts, stops, and derives its identity from.
#[derive(Clone)]
pub struct Collaborators {
    pub wallet: Arc<dyn Wallet>,
    pub channel_db: Arc<dyn ChannelDatabase>,
    pub funding: Arc<dyn FundingManager>,
    pub rpc: Arc<dyn RpcService>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// State shared by the accept loops, dial tasks, and the registry actor.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) executor: TaskExecutor,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) metrics: ServerMetrics,
    dialer: Dialer,
    ids: PeerIdGenerator,
    new_peers: mpsc::Sender<Peer>,
    departures: mpsc::UnboundedSender<PeerId>,
}

impl Shared {
    /// Start a peer on `conn` and hand it to the registry actor.
    pub(crate) async fn publish(
        &self,
        conn: AuthenticatedConnection,
        direction: Direction,
    ) -> Result<PeerId, ConnectError> {
        if self.lifecycle.is_stopping() {
            return Err(ConnectError::ShuttingDown);
        }

        let mut peer = Peer::new(self.ids.next(), conn, direction);
        let id = peer.id();
        peer.start(&self.executor, self.departures.clone());

        if let Err(mpsc::error::SendError(peer)) = self.new_peers.send(peer).await {
            peer.stop();
            return Err(ConnectError::ShuttingDown);
        }
        Ok(id)
    }

    /// Dial `address` and publish the resulting outbound peer.
    pub(crate) async fn connect(
        &self,
        address: NodeAddress,
        shutdown: Shutdown,
    ) -> Result<PeerId, ConnectError> {
        let conn = self.dialer.dial(&address, shutdown).await?;
        self.publish(conn, Direction::Outbound).await
    }
}

/// Receivers consumed by the registry actor once the server starts.
struct ActorInputs {
    new_peers: mpsc::Receiver<Peer>,
    departures: mpsc::UnboundedReceiver<PeerId>,
    commands: mpsc::Receiver<Command>,
}

/// Accepts and dials peers, serves [`Command`]s, and tears everything down in order.
///
/// Construction binds every listener but spawns nothing. [`start`](Self::start) launches one
/// accept loop per listener, the funding manager, and the registry actor.
/// [`stop`](Self::stop) closes the listeners, stops the collaborators (RPC, funding, wallet),
/// fires the shutdown signal, and waits for every spawned task to exit.
pub struct Server {
    identity: IdentityKey,
    listeners: Vec<Arc<dyn Listener>>,
    collaborators: Collaborators,
    shared: Arc<Shared>,
    handle: ServerHandle,
    actor: Mutex<Option<ActorInputs>>,
    tasks: Mutex<TaskManager>,
    /// Held for the whole of `start` and `stop`, so teardown never overlaps a start.
    transitions: tokio::sync::Mutex<()>,
}

impl Server {
    /// Derive the identity key and bind every configured listener.
    ///
    /// Must be called within a tokio runtime. Fails without leaving any listener bound.
    pub async fn new(
        config: ServerConfig,
        collaborators: Collaborators,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ServerError> {
        let identity =
            identity_key(collaborators.wallet.as_ref(), collaborators.channel_db.as_ref())?;

        let mut listeners: Vec<Arc<dyn Listener>> = Vec::with_capacity(config.listen_addrs.len());
        for addr in &config.listen_addrs {
            match transport.listen(&identity, addr).await {
                Ok(listener) => {
                    info!(addr = %listener.local_addr(), "listening");
                    listeners.push(listener);
                }
                Err(source) => {
                    for listener in &listeners {
                        let _ = listener.close();
                    }
                    return Err(ServerError::Listen { addr: addr.clone(), source });
                }
            }
        }

        let tasks = TaskManager::current();
        let lifecycle = Lifecycle::new();
        let (new_peers_tx, new_peers) = mpsc::channel(config.peer_buffer.max(1));
        let (departures_tx, departures) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::channel(config.command_buffer.max(1));

        let shared = Arc::new(Shared {
            executor: tasks.executor(),
            lifecycle: lifecycle.clone(),
            metrics: ServerMetrics::default(),
            dialer: Dialer::new(transport, identity.clone(), config.dialer),
            ids: PeerIdGenerator::default(),
            new_peers: new_peers_tx,
            departures: departures_tx,
        });

        Ok(Self {
            identity,
            listeners,
            collaborators,
            shared,
            handle: ServerHandle::new(commands_tx, lifecycle.subscribe()),
            actor: Mutex::new(Some(ActorInputs {
                new_peers,
                departures,
                commands,
            })),
            tasks: Mutex::new(tasks),
            transitions: tokio::sync::Mutex::new(()),
        })
    }

    /// Launch the accept loops, the funding manager, and the registry actor.
    ///
    /// Returns `Ok(false)` if the server was already started or stopped. A funding manager
    /// failure is returned as is; the server is then left for [`stop`](Self::stop) to tear down.
    pub async fn start(&self) -> Result<bool, ServerError> {
        let _transition = self.transitions.lock().await;
        if !self
            .shared
            .lifecycle
            .transition(&[LifecycleState::Created], LifecycleState::Running)
        {
            return Ok(false);
        }
        let Some(inputs) = self.actor.lock().take() else {
            return Ok(false);
        };

        let executor = &self.shared.executor;
        for listener in &self.listeners {
            let (listener, shared) = (Arc::clone(listener), Arc::clone(&self.shared));
            executor.spawn_critical_with_graceful_shutdown_signal("listener", move |shutdown| {
                accept_loop(listener, shared, shutdown)
            });
        }

        self.collaborators.funding.start().await.map_err(ServerError::Funding)?;

        let actor = RegistryActor::new(
            inputs.new_peers,
            inputs.departures,
            inputs.commands,
            Arc::clone(&self.shared),
        );
        executor.spawn_critical_with_graceful_shutdown_signal("registry", move |shutdown| {
            actor.run(shutdown)
        });

        info!(listeners = self.listeners.len(), "server started");
        Ok(true)
    }

    /// Tear the server down. Returns `Ok(false)` if teardown already ran.
    ///
    /// A `start` in progress finishes first. Every step runs even if an earlier one fails; the
    /// failures are returned together once all tasks have exited.
    pub async fn stop(&self) -> Result<bool, ShutdownError> {
        let _transition = self.transitions.lock().await;
        if !self.shared.lifecycle.transition(
            &[LifecycleState::Created, LifecycleState::Running],
            LifecycleState::Stopping,
        ) {
            return Ok(false);
        }
        info!("stopping server");

        let mut errors = Vec::new();
        for listener in &self.listeners {
            if let Err(source) = listener.close() {
                errors.push(TeardownError::Listener { addr: listener.local_addr(), source });
            }
        }
        if let Err(err) = self.collaborators.rpc.stop().await {
            errors.push(TeardownError::Rpc(err));
        }
        if let Err(err) = self.collaborators.funding.stop().await {
            errors.push(TeardownError::Funding(err));
        }
        if let Err(err) = self.collaborators.wallet.shutdown().await {
            errors.push(TeardownError::Wallet(err));
        }

        self.tasks.lock().fire_shutdown_signal();
        // never started
        self.actor.lock().take();
        self.shared.executor.wait_for_graceful_tasks().await;
        self.shared.lifecycle.transition(&[LifecycleState::Stopping], LifecycleState::Stopped);

        if errors.is_empty() {
            info!("server stopped");
            return Ok(true);
        }
        for err in &errors {
            warn!(%err, "teardown step failed");
        }
        Err(ShutdownError::new(errors))
    }

    /// Resolves once a [`stop`](Self::stop) call, from any caller, has finished teardown.
    pub async fn wait_for_shutdown(&self) {
        self.shared.lifecycle.stopped().await;
    }

    /// Resolves if a listener or the registry actor panics.
    pub async fn critical_failure(&self) -> PanickedTaskError {
        let tasks = &self.tasks;
        match poll_fn(|cx| Pin::new(&mut *tasks.lock()).poll(cx)).await {
            Err(err) => err,
            // the manager keeps its own sender, so the channel never closes
            Ok(()) => pending().await,
        }
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    /// Bound addresses, in configuration order.
    pub fn local_addrs(&self) -> Vec<String> {
        self.listeners.iter().map(|listener| listener.local_addr()).collect()
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    /// Graceful tasks currently running: accept loops, the registry actor, peer tasks, dials.
    pub fn active_tasks(&self) -> usize {
        self.shared.executor.graceful_tasks()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("public_key", self.identity.public_key())
            .field("listeners", &self.local_addrs())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn identity_key(
    wallet: &dyn Wallet,
    channel_db: &dyn ChannelDatabase,
) -> Result<IdentityKey, ServerError> {
    let address = channel_db.identity_address()?;
    let key = wallet.managed_key(&address)?.private_key()?;
    info!(%address, public_key = %key.public_key(), "loaded identity key");
    Ok(key)
}
