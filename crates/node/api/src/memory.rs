//! In-memory collaborators for tests and ephemeral nodes.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use ember_net_transport::{IdentityKey, KeyHash};
use parking_lot::RwLock;
use tracing::debug;

use crate::{
    ChannelDatabase, ChannelDbError, FundingManager, LifecycleError, ManagedKey, RpcService,
    Wallet, WalletError,
};

/// Wallet holding identity keys in memory.
#[derive(Debug, Default)]
pub struct MemoryWallet {
    keys: RwLock<HashMap<KeyHash, IdentityKey>>,
    shut_down: AtomicBool,
}

impl MemoryWallet {
    /// Create an empty wallet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `key`, returning the address it is managed under.
    pub fn insert(&self, key: IdentityKey) -> KeyHash {
        let address = key.key_hash();
        self.keys.write().insert(address, key);
        address
    }

    /// Whether [`Wallet::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Wallet for MemoryWallet {
    fn managed_key(&self, address: &KeyHash) -> Result<Box<dyn ManagedKey>, WalletError> {
        if self.is_shut_down() {
            return Err(WalletError::Locked);
        }
        let key = self
            .keys
            .read()
            .get(address)
            .cloned()
            .ok_or(WalletError::KeyNotFound(*address))?;
        Ok(Box::new(MemoryManagedKey(key)))
    }

    async fn shutdown(&self) -> Result<(), WalletError> {
        self.shut_down.store(true, Ordering::Release);
        debug!("memory wallet shut down");
        Ok(())
    }
}

/// A key entry of [`MemoryWallet`]. Also usable on its own around a known key.
#[derive(Debug, Clone)]
pub struct MemoryManagedKey(pub IdentityKey);

impl ManagedKey for MemoryManagedKey {
    fn address(&self) -> KeyHash {
        self.0.key_hash()
    }

    fn private_key(&self) -> Result<IdentityKey, WalletError> {
        Ok(self.0.clone())
    }
}

/// Channel database that only knows the identity address.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannelDb {
    identity: Option<KeyHash>,
}

impl MemoryChannelDb {
    /// A database with `identity` persisted.
    pub fn new(identity: KeyHash) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    /// A database with nothing persisted.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl ChannelDatabase for MemoryChannelDb {
    fn identity_address(&self) -> Result<KeyHash, ChannelDbError> {
        self.identity.ok_or(ChannelDbError::MissingIdentity)
    }
}

/// Funding manager with no funding flows.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFundingManager;

#[async_trait]
impl FundingManager for NoopFundingManager {
    async fn start(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        Ok(())
    }
}

/// RPC service that serves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRpcService;

#[async_trait]
impl RpcService for NoopRpcService {
    async fn stop(&self) -> Result<(), LifecycleError> {
        Ok(())
    }
}
