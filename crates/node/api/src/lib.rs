//! Collaborator contracts of the ember connection server.
//!
//! The server consumes these through narrow interfaces:
//!
//! ```text
//! ChannelDatabase::identity_address ──► Wallet::managed_key ──► ManagedKey::private_key
//!                                                                   (node identity)
//! FundingManager::start / stop
//! RpcService::stop
//! Wallet::shutdown
//! ```
//!
//! [`memory`] has in-memory implementations for tests and ephemeral nodes.

#![warn(missing_docs)]

mod lifecycle;
pub mod memory;
mod wallet;

pub use lifecycle::{FundingManager, LifecycleError, RpcService};
pub use memory::{MemoryChannelDb, MemoryManagedKey, MemoryWallet, NoopFundingManager, NoopRpcService};
pub use wallet::{ChannelDatabase, ChannelDbError, ManagedKey, Wallet, WalletError};

pub use async_trait::async_trait;
