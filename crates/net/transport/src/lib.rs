//! Authenticated transports for ember.
//!
//! A [`Transport`] dials remote nodes and binds [`Listener`]s; both yield
//! [`AuthenticatedConnection`]s whose remote public key has been proven. Two providers:
//!
//! - [`MemoryTransport`] - in-process hub, used by tests and embedded setups
//! - [`TcpTransport`] - TCP with a signed hello handshake

mod address;
mod connection;
mod error;
mod handshake;
mod identity;
mod memory;
mod tcp;
mod traits;

pub use address::NodeAddress;
pub use connection::{AuthenticatedConnection, BoxedStream, ByteStream};
pub use error::{AddressError, HandshakeError, IdentityError, TransportError};
pub use identity::{
    IdentityKey, KEY_HASH_LEN, KeyHash, PUBLIC_KEY_LEN, PublicKey, RemoteIdentity,
    recover_public_key,
};
pub use memory::MemoryTransport;
pub use tcp::{DEFAULT_HANDSHAKE_TIMEOUT, TcpTransport};
pub use traits::{Listener, Transport};

use tokio::sync::watch;

/// Resolves once the flag is set or its sender is gone.
async fn wait_closed(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}
