//! Peer bookkeeping for the connection server.
//!
//! - [`PeerRegistry`] - peers by id plus the channel-outpoint index
//! - [`PeerId`], [`PeerIdGenerator`] - peer identifiers
//! - [`OutPoint`] - funded channel reference
//! - [`Direction`] - which side opened a connection

mod registry;
mod types;

pub use registry::{InsertResult, PeerRegistry, RegisteredPeer, RegistryError};
pub use types::{Direction, OutPoint, OutPointError, PeerId, PeerIdGenerator};
