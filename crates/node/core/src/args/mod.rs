//! CLI argument structs for the node.
//!
//! Every field is optional on the command line. Fields that are set are layered over the loaded
//! configuration, so they serialize with `skip_serializing_if` and are left out when unset.

mod datadir;
mod identity;
mod log;
mod network;

pub use datadir::DataDirArgs;
pub use identity::IdentityArgs;
pub use log::LogArgs;
pub use network::NetworkArgs;
