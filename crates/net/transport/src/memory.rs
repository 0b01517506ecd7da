//! In-process transport.
//!
//! Listeners register under their endpoint string in a hub shared by every clone of a
//! [`MemoryTransport`]. A dial completes only once the listener has accepted it, so a listener
//! that never calls `accept` leaves its dialers pending.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    io::DuplexStream,
    sync::{mpsc, oneshot, watch},
};
use tracing::trace;

use crate::{
    AuthenticatedConnection, HandshakeError, IdentityKey, Listener, PublicKey, RemoteIdentity,
    Transport, TransportError, wait_closed,
};

/// Capacity of each direction of an in-memory stream.
const STREAM_BUFFER: usize = 64 * 1024;

/// Dials queued for a listener before further dials wait.
const ACCEPT_BACKLOG: usize = 32;

type Hub = Arc<Mutex<HashMap<String, HubEntry>>>;

struct HubEntry {
    key: PublicKey,
    inbound: mpsc::Sender<PendingDial>,
}

struct PendingDial {
    stream: DuplexStream,
    dialer_key: PublicKey,
    dialer_endpoint: String,
    accepted: oneshot::Sender<()>,
}

/// Transport connecting listeners and dialers within one process.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    hub: Hub,
    ephemeral: Arc<AtomicU64>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("listeners", &self.hub.lock().len())
            .finish()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a listener is registered at `endpoint`.
    pub fn is_listening(&self, endpoint: &str) -> bool {
        self.hub.lock().contains_key(endpoint)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn listen(
        &self,
        identity: &IdentityKey,
        addr: &str,
    ) -> Result<Arc<dyn Listener>, TransportError> {
        let mut hub = self.hub.lock();
        if hub.contains_key(addr) {
            return Err(TransportError::AddressInUse(addr.to_string()));
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(ACCEPT_BACKLOG);
        hub.insert(
            addr.to_string(),
            HubEntry {
                key: *identity.public_key(),
                inbound: inbound_tx,
            },
        );
        trace!(%addr, "memory listener bound");

        Ok(Arc::new(MemoryListener {
            addr: addr.to_string(),
            hub: Arc::clone(&self.hub),
            inbound: tokio::sync::Mutex::new(inbound_rx),
            closed: watch::Sender::new(false),
        }))
    }

    async fn dial(
        &self,
        identity: &IdentityKey,
        endpoint: &str,
        remote: &RemoteIdentity,
    ) -> Result<AuthenticatedConnection, TransportError> {
        let (key, inbound) = self
            .hub
            .lock()
            .get(endpoint)
            .map(|entry| (entry.key, entry.inbound.clone()))
            .ok_or_else(|| TransportError::ConnectionRefused(endpoint.to_string()))?;

        if !remote.matches(&key) {
            return Err(HandshakeError::IdentityMismatch {
                expected: *remote,
                actual: key,
            }
            .into());
        }

        let (local, peer) = tokio::io::duplex(STREAM_BUFFER);
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let dialer_endpoint = format!(
            "memory-ephemeral-{}",
            self.ephemeral.fetch_add(1, Ordering::Relaxed)
        );

        inbound
            .send(PendingDial {
                stream: peer,
                dialer_key: *identity.public_key(),
                dialer_endpoint,
                accepted: accepted_tx,
            })
            .await
            .map_err(|_| TransportError::ConnectionRefused(endpoint.to_string()))?;

        accepted_rx.await.map_err(|_| HandshakeError::Aborted)?;
        Ok(AuthenticatedConnection::new(local, key, endpoint))
    }
}

struct MemoryListener {
    addr: String,
    hub: Hub,
    inbound: tokio::sync::Mutex<mpsc::Receiver<PendingDial>>,
    closed: watch::Sender<bool>,
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&self) -> Result<AuthenticatedConnection, TransportError> {
        let closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::ListenerClosed);
        }

        tokio::select! {
            _ = wait_closed(closed) => Err(TransportError::ListenerClosed),
            dial = async { self.inbound.lock().await.recv().await } => {
                let dial = dial.ok_or(TransportError::ListenerClosed)?;
                // the dialer gave up before we got to it
                dial.accepted.send(()).map_err(|_| HandshakeError::Aborted)?;
                Ok(AuthenticatedConnection::new(dial.stream, dial.dialer_key, dial.dialer_endpoint))
            }
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.send_replace(true) {
            return Ok(());
        }
        self.hub.lock().remove(&self.addr);
        // refuse whatever is still queued
        if let Ok(mut inbound) = self.inbound.try_lock() {
            inbound.close();
            while inbound.try_recv().is_ok() {}
        }
        trace!(addr = %self.addr, "memory listener closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn local_addr(&self) -> String {
        self.addr.clone()
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_dial_and_accept() {
        let transport = MemoryTransport::new();
        let server = IdentityKey::random().unwrap();
        let client = IdentityKey::random().unwrap();

        let listener = transport.listen(&server, "node-a").await.unwrap();
        let remote = RemoteIdentity::PubKey(*server.public_key());

        let (dialed, accepted) =
            tokio::join!(transport.dial(&client, "node-a", &remote), listener.accept());
        let dialed = dialed.unwrap();
        let accepted = accepted.unwrap();

        assert_eq!(dialed.remote_key(), server.public_key());
        assert_eq!(dialed.remote_endpoint(), "node-a");
        assert_eq!(accepted.remote_key(), client.public_key());

        let mut out = dialed.into_stream();
        let mut inc = accepted.into_stream();
        out.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        inc.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_dial_unknown_endpoint_refused() {
        let transport = MemoryTransport::new();
        let client = IdentityKey::random().unwrap();
        let remote = RemoteIdentity::PubKey(*IdentityKey::random().unwrap().public_key());

        let result = transport.dial(&client, "nowhere", &remote).await;
        assert_matches!(result, Err(TransportError::ConnectionRefused(e)) if e == "nowhere");
    }

    #[tokio::test]
    async fn test_dial_wrong_identity() {
        let transport = MemoryTransport::new();
        let server = IdentityKey::random().unwrap();
        let client = IdentityKey::random().unwrap();
        let _listener = transport.listen(&server, "node-a").await.unwrap();

        let remote = RemoteIdentity::KeyHash(client.key_hash());
        let result = transport.dial(&client, "node-a", &remote).await;
        assert_matches!(
            result,
            Err(TransportError::Handshake(HandshakeError::IdentityMismatch { .. }))
        );
    }

    #[tokio::test]
    async fn test_listen_twice_in_use() {
        let transport = MemoryTransport::new();
        let server = IdentityKey::random().unwrap();
        let _listener = transport.listen(&server, "node-a").await.unwrap();

        let result = transport.listen(&server, "node-a").await;
        assert_matches!(result, Err(TransportError::AddressInUse(_)));
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_future_accepts() {
        let transport = MemoryTransport::new();
        let server = IdentityKey::random().unwrap();
        let listener = transport.listen(&server, "node-a").await.unwrap();

        let pending = {
            let listener = Arc::clone(&listener);
            tokio::spawn(async move { listener.accept().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        listener.close().unwrap();
        assert!(listener.is_closed());
        assert!(!transport.is_listening("node-a"));
        listener.close().unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert_matches!(result, Err(TransportError::ListenerClosed));
        assert_matches!(listener.accept().await, Err(TransportError::ListenerClosed));
    }

    #[tokio::test]
    async fn test_dial_waits_for_accept() {
        let transport = MemoryTransport::new();
        let server = IdentityKey::random().unwrap();
        let client = IdentityKey::random().unwrap();
        let listener = transport.listen(&server, "node-a").await.unwrap();
        let remote = RemoteIdentity::PubKey(*server.public_key());

        let dial = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.dial(&client, "node-a", &remote).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!dial.is_finished());

        listener.accept().await.unwrap();
        let dialed = tokio::time::timeout(Duration::from_secs(1), dial)
            .await
            .unwrap()
            .unwrap();
        assert!(dialed.is_ok());
    }
}
