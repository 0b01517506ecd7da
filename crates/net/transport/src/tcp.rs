//! TCP transport authenticated with a signed hello handshake.

use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
};
use tracing::{debug, trace};

use crate::{
    AuthenticatedConnection, IdentityKey, Listener, RemoteIdentity, Transport, TransportError,
    handshake, wait_closed,
};

/// Default time allowed for the handshake after a TCP connection is established.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TcpTransport {
    handshake_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT)
    }
}

impl TcpTransport {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn listen(
        &self,
        identity: &IdentityKey,
        addr: &str,
    ) -> Result<Arc<dyn Listener>, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|err| match err.kind() {
            io::ErrorKind::AddrInUse => TransportError::AddressInUse(addr.to_string()),
            _ => TransportError::Io(err),
        })?;
        let local_addr = listener.local_addr()?.to_string();
        debug!(%local_addr, "tcp listener bound");

        Ok(Arc::new(TcpTransportListener {
            inner: Mutex::new(Some(Arc::new(listener))),
            local_addr,
            identity: identity.clone(),
            handshake_timeout: self.handshake_timeout,
            closed: watch::Sender::new(false),
        }))
    }

    async fn dial(
        &self,
        identity: &IdentityKey,
        endpoint: &str,
        remote: &RemoteIdentity,
    ) -> Result<AuthenticatedConnection, TransportError> {
        let mut stream = TcpStream::connect(endpoint).await.map_err(|err| match err.kind() {
            io::ErrorKind::ConnectionRefused => {
                TransportError::ConnectionRefused(endpoint.to_string())
            }
            _ => TransportError::Io(err),
        })?;
        stream.set_nodelay(true)?;

        let remote_key =
            handshake::initiate(&mut stream, identity, remote, self.handshake_timeout).await?;
        trace!(%endpoint, %remote_key, "outbound tcp connection authenticated");
        Ok(AuthenticatedConnection::new(stream, remote_key, endpoint))
    }
}

struct TcpTransportListener {
    inner: Mutex<Option<Arc<TcpListener>>>,
    local_addr: String,
    identity: IdentityKey,
    handshake_timeout: Duration,
    closed: watch::Sender<bool>,
}

impl TcpTransportListener {
    async fn accept_authenticated(
        &self,
        listener: &TcpListener,
    ) -> Result<AuthenticatedConnection, TransportError> {
        let (mut stream, remote) = listener.accept().await?;
        stream.set_nodelay(true)?;
        let remote_key =
            handshake::respond(&mut stream, &self.identity, self.handshake_timeout).await?;
        trace!(%remote, %remote_key, "inbound tcp connection authenticated");
        Ok(AuthenticatedConnection::new(stream, remote_key, remote.to_string()))
    }
}

#[async_trait]
impl Listener for TcpTransportListener {
    async fn accept(&self) -> Result<AuthenticatedConnection, TransportError> {
        let closed = self.closed.subscribe();
        let listener = self.inner.lock().clone().ok_or(TransportError::ListenerClosed)?;

        tokio::select! {
            _ = wait_closed(closed) => Err(TransportError::ListenerClosed),
            result = self.accept_authenticated(&listener) => result,
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.send_replace(true) {
            return Ok(());
        }
        // the socket is released once in-flight accepts drop their clone
        self.inner.lock().take();
        debug!(local_addr = %self.local_addr, "tcp listener closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn local_addr(&self) -> String {
        self.local_addr.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HandshakeError, PublicKey};
    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn bind(identity: &IdentityKey) -> Arc<dyn Listener> {
        TcpTransport::default().listen(identity, "127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn test_dial_authenticates_both_sides() {
        let server = IdentityKey::random().unwrap();
        let client = IdentityKey::random().unwrap();
        let listener = bind(&server).await;
        let endpoint = listener.local_addr();

        let remote = RemoteIdentity::PubKey(*server.public_key());
        let transport = TcpTransport::default();
        let (dialed, accepted) =
            tokio::join!(transport.dial(&client, &endpoint, &remote), listener.accept());
        let dialed = dialed.unwrap();
        let accepted = accepted.unwrap();

        assert_eq!(dialed.remote_key(), server.public_key());
        assert_eq!(dialed.remote_endpoint(), endpoint);
        assert_eq!(accepted.remote_key(), client.public_key());

        let mut out = dialed.into_stream();
        let mut inc = accepted.into_stream();
        out.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        inc.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_dial_rejects_unexpected_key() {
        let server = IdentityKey::random().unwrap();
        let client = IdentityKey::random().unwrap();
        let listener = bind(&server).await;
        let endpoint = listener.local_addr();

        let wrong: PublicKey = *IdentityKey::random().unwrap().public_key();
        let transport = TcpTransport::default();
        let remote = RemoteIdentity::PubKey(wrong);
        let (dialed, accepted) = tokio::join!(
            transport.dial(&client, &endpoint, &remote),
            listener.accept()
        );

        assert_matches!(
            dialed,
            Err(TransportError::Handshake(HandshakeError::IdentityMismatch { .. }))
        );
        assert_matches!(accepted, Err(TransportError::Handshake(_)));
    }

    #[tokio::test]
    async fn test_dial_closed_port_refused() {
        let server = IdentityKey::random().unwrap();
        let listener = bind(&server).await;
        let endpoint = listener.local_addr();
        drop(listener);

        let client = IdentityKey::random().unwrap();
        let remote = RemoteIdentity::PubKey(*server.public_key());
        let result = TcpTransport::default().dial(&client, &endpoint, &remote).await;
        assert_matches!(result, Err(TransportError::ConnectionRefused(_)));
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_future_accepts() {
        let server = IdentityKey::random().unwrap();
        let listener = bind(&server).await;

        let pending = {
            let listener = Arc::clone(&listener);
            tokio::spawn(async move { listener.accept().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        listener.close().unwrap();
        assert!(listener.is_closed());

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert_matches!(result, Err(TransportError::ListenerClosed));
        assert_matches!(listener.accept().await, Err(TransportError::ListenerClosed));
    }
}
