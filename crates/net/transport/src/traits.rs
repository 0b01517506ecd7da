//! Transport and listener contracts.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{AuthenticatedConnection, IdentityKey, RemoteIdentity, TransportError};

/// Produces authenticated connections, outbound by dialing and inbound by listening.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Bind a listener on `addr` that authenticates inbound connections as `identity`.
    async fn listen(
        &self,
        identity: &IdentityKey,
        addr: &str,
    ) -> Result<Arc<dyn Listener>, TransportError>;

    /// Connect to `endpoint` and authenticate it as `remote`.
    ///
    /// Fails with [`HandshakeError::IdentityMismatch`](crate::HandshakeError::IdentityMismatch)
    /// if the node at `endpoint` is not `remote`.
    async fn dial(
        &self,
        identity: &IdentityKey,
        endpoint: &str,
        remote: &RemoteIdentity,
    ) -> Result<AuthenticatedConnection, TransportError>;
}

/// A bound listener.
///
/// After [`close`](Listener::close), pending and future [`accept`](Listener::accept) calls fail
/// with [`TransportError::ListenerClosed`].
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Wait for the next authenticated inbound connection.
    async fn accept(&self) -> Result<AuthenticatedConnection, TransportError>;

    /// Stop accepting. Idempotent.
    fn close(&self) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;

    /// The address actually bound, which differs from the requested one for port 0.
    fn local_addr(&self) -> String;
}

impl std::fmt::Debug for dyn Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("local_addr", &self.local_addr()).finish_non_exhaustive()
    }
}
