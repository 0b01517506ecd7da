//! Identity and keystore CLI arguments.

use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

/// Identity key configuration.
///
/// By default the identity key lives in an encrypted keystore under `{datadir}/keystore/`,
/// unlocked by a password generated into `{datadir}/password` on first run.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq, Serialize)]
#[command(next_help_heading = "Identity")]
pub struct IdentityArgs {
    /// Use a random identity that is never persisted.
    #[arg(long, conflicts_with_all = ["password", "password_file", "keystore_dir"])]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ephemeral: bool,

    /// Keystore directory path.
    #[arg(long = "keystore-dir", value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keystore_dir: Option<PathBuf>,

    /// Keystore password.
    #[arg(long, env = "EMBER_PASSWORD", conflicts_with = "password_file", hide_env_values = true)]
    #[serde(skip)]
    pub password: Option<String>,

    /// Path to the keystore password file.
    #[arg(long = "password-file", value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
}
