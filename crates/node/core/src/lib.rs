//! Node infrastructure shared by the ember binary.
//!
//! - [`args`] - CLI argument structs, also used as configuration overrides
//! - [`dirs`] - data directory layout
//! - [`keystore`] - encrypted identity key storage and the keystore-backed wallet
//! - [`chandb`] - file channel database holding the identity address
//! - [`logging`] - tracing subscriber setup
//! - [`version`] - version information

pub mod args;
pub mod chandb;
pub mod dirs;
pub mod keystore;
pub mod logging;
pub mod version;
