//! File channel database.
//!
//! Only the part the connection server reads is persisted: the address of the node identity key.

use ember_net_transport::KeyHash;
use ember_node_api::{ChannelDatabase, ChannelDbError};
use eyre::{Result, WrapErr};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChannelDbFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity_address: Option<String>,
}

/// Channel database stored as a TOML file.
#[derive(Debug)]
pub struct FileChannelDb {
    path: PathBuf,
    contents: RwLock<ChannelDbFile>,
}

impl FileChannelDb {
    /// Open the database at `path`. A missing file is an empty database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let contents = if path.exists() {
            let raw = fs::read_to_string(&path)
                .wrap_err_with(|| format!("failed to read channel database {}", path.display()))?;
            toml::from_str(&raw)
                .wrap_err_with(|| format!("failed to parse channel database {}", path.display()))?
        } else {
            ChannelDbFile::default()
        };
        Ok(Self {
            path,
            contents: RwLock::new(contents),
        })
    }

    /// Persist `address` as the identity address unless one is already stored.
    ///
    /// Returns the stored address, which differs from `address` if the database already belongs
    /// to another identity.
    pub fn init_identity(&self, address: KeyHash) -> Result<KeyHash> {
        if let Ok(existing) = self.identity_address() {
            return Ok(existing);
        }

        let mut contents = self.contents.write();
        contents.identity_address = Some(address.to_string());
        let raw = toml::to_string(&*contents).wrap_err("failed to encode channel database")?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, raw)
            .wrap_err_with(|| format!("failed to write channel database {}", self.path.display()))?;

        info!(%address, path = %self.path.display(), "recorded identity address");
        Ok(address)
    }
}

impl ChannelDatabase for FileChannelDb {
    fn identity_address(&self) -> Result<KeyHash, ChannelDbError> {
        let contents = self.contents.read();
        let address = contents.identity_address.as_deref().ok_or(ChannelDbError::MissingIdentity)?;
        address
            .parse()
            .map_err(|err| ChannelDbError::Backend(format!("invalid identity address: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_net_transport::IdentityKey;

    #[test]
    fn test_identity_address_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.toml");
        let address = IdentityKey::random().unwrap().key_hash();

        let db = FileChannelDb::open(&path).unwrap();
        assert!(matches!(db.identity_address(), Err(ChannelDbError::MissingIdentity)));
        assert_eq!(db.init_identity(address).unwrap(), address);

        let reopened = FileChannelDb::open(&path).unwrap();
        assert_eq!(reopened.identity_address().unwrap(), address);

        // first identity wins
        let other = IdentityKey::random().unwrap().key_hash();
        assert_eq!(reopened.init_identity(other).unwrap(), address);
    }

    #[test]
    fn test_corrupt_identity_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.toml");
        fs::write(&path, "identity_address = \"not-an-address\"\n").unwrap();

        let db = FileChannelDb::open(&path).unwrap();
        assert!(matches!(db.identity_address(), Err(ChannelDbError::Backend(_))));
    }
}
