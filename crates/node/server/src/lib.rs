//! Peer connection server for an ember node.
//!
//! ```text
//!  listeners ──accept──┐
//!                      ├──► new peers ──┐
//!  dialer ────dial─────┘                ├──► RegistryActor ──► PeerRegistry
//!  ServerHandle ──► commands ───────────┤
//!  peer tasks ──► departures ───────────┘
//! ```
//!
//! - [`Server`] - construction, start, stop and the shutdown join point
//! - [`ServerHandle`] - cloneable command interface to a running server
//! - [`Peer`] - one authenticated connection with its reader and writer tasks
//!
//! All mutable peer state is owned by a single registry task; everything else talks to it over
//! channels.

mod command;
mod config;
mod error;
mod lifecycle;
mod listener;
mod metrics;
mod peer;
mod registry;
mod server;

pub use command::{Command, ConnectPeerResponse, SENTINEL_PEER_ID, ServerHandle};
pub use config::{DEFAULT_COMMAND_BUFFER, DEFAULT_PEER_BUFFER, ServerConfig};
pub use error::{CommandError, ConnectError, ServerError, ShutdownError, TeardownError};
pub use lifecycle::LifecycleState;
pub use peer::{Peer, PeerError, PeerState, PeerSummary};
pub use server::{Collaborators, Server};
