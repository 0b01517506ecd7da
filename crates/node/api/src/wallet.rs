//! Wallet and channel-database contracts used to derive the node identity.

use async_trait::async_trait;
use ember_net_transport::{IdentityError, IdentityKey, KeyHash};

/// Error returned by a [`Wallet`] or [`ManagedKey`].
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// No managed key exists for the address.
    #[error("no managed key for address {0}")]
    KeyNotFound(KeyHash),
    /// The wallet has been shut down or is not unlocked.
    #[error("wallet is locked")]
    Locked,
    /// The stored key material is not a valid identity key.
    #[error(transparent)]
    InvalidKey(#[from] IdentityError),
    /// Backend specific failure.
    #[error("wallet backend: {0}")]
    Backend(String),
}

/// Error returned by a [`ChannelDatabase`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelDbError {
    /// No identity address has been persisted yet.
    #[error("no identity address stored")]
    MissingIdentity,
    /// Backend specific failure.
    #[error("channel database backend: {0}")]
    Backend(String),
}

/// A key entry held by the wallet.
pub trait ManagedKey: Send + Sync {
    /// Address the entry is stored under.
    fn address(&self) -> KeyHash;

    /// Extract the private key.
    fn private_key(&self) -> Result<IdentityKey, WalletError>;
}

impl std::fmt::Debug for dyn ManagedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedKey").field("address", &self.address()).finish_non_exhaustive()
    }
}

/// Key management collaborator.
#[async_trait]
pub trait Wallet: Send + Sync + 'static {
    /// Resolve `address` to its managed key entry.
    fn managed_key(&self, address: &KeyHash) -> Result<Box<dyn ManagedKey>, WalletError>;

    /// Release the wallet. Later key lookups fail with [`WalletError::Locked`].
    async fn shutdown(&self) -> Result<(), WalletError>;
}

/// Persistent node metadata collaborator.
#[auto_impl::auto_impl(&, Arc)]
pub trait ChannelDatabase: Send + Sync + 'static {
    /// The address of the node's identity key.
    fn identity_address(&self) -> Result<KeyHash, ChannelDbError>;
}
