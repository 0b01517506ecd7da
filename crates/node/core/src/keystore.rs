//! Keystore management for the node identity.
//!
//! Keys are stored with alloy's `LocalSigner` keystore support, in the Ethereum JSON v3 format
//! (AES-128-CTR with scrypt key derivation).

use alloy_signer_local::LocalSigner;
use async_trait::async_trait;
use ember_net_transport::{IdentityKey, KeyHash};
use ember_node_api::{ManagedKey, MemoryManagedKey, Wallet, WalletError};
use eyre::{Result, WrapErr};
use parking_lot::RwLock;
use rand_08::RngCore;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};
use tracing::{debug, info};

/// Keystore entry holding the node identity key.
pub const IDENTITY_KEY_NAME: &str = "identity";

/// Encrypted key files in one directory.
#[derive(Debug, Clone)]
pub struct FileKeystore {
    path: PathBuf,
}

impl FileKeystore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn key_path(&self, name: &str) -> PathBuf {
        // written without an extension when a name is given
        self.path.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.key_path(name).exists()
    }

    /// Decrypt the key stored under `name`.
    pub fn load(&self, name: &str, password: &str) -> Result<IdentityKey> {
        let path = self.key_path(name);
        let signer = LocalSigner::decrypt_keystore(&path, password)
            .wrap_err_with(|| format!("failed to decrypt key '{name}' from {}", path.display()))?;
        IdentityKey::new(signer.credential().clone())
            .wrap_err_with(|| format!("key '{name}' is not a valid identity key"))
    }

    /// Encrypt `key` under `name`, readable by the owner only.
    pub fn save(&self, name: &str, key: &IdentityKey, password: &str) -> Result<()> {
        fs::create_dir_all(&self.path).wrap_err_with(|| {
            format!("failed to create keystore directory {}", self.path.display())
        })?;

        let secret = key.signing_key().to_bytes();
        LocalSigner::encrypt_keystore(
            &self.path,
            &mut rand_08::thread_rng(),
            secret.as_slice(),
            password,
            Some(name),
        )
        .wrap_err_with(|| format!("failed to encrypt and save key '{name}'"))?;

        restrict_permissions(&self.key_path(name))
    }

    /// Load the key under `name`, generating and saving a new one on first use.
    pub fn load_or_create(&self, name: &str, password: &str) -> Result<IdentityKey> {
        if self.exists(name) {
            info!(path = %self.key_path(name).display(), "loading identity key from keystore");
            return self.load(name, password);
        }

        info!(path = %self.key_path(name).display(), "generating new identity key");
        let key = IdentityKey::random().wrap_err("failed to generate identity key")?;
        self.save(name, &key, password)?;
        Ok(key)
    }
}

/// Resolve the keystore password.
///
/// Priority: explicit password > password file > `generated`, which is created with a random
/// password on first use.
pub fn resolve_password(
    password: Option<&str>,
    password_file: Option<&Path>,
    generated: &Path,
) -> Result<String> {
    if let Some(password) = password {
        return Ok(password.to_string());
    }

    let path = password_file.unwrap_or(generated);
    if password_file.is_none() && !path.exists() {
        let mut secret = [0u8; 32];
        rand_08::thread_rng().fill_bytes(&mut secret);
        fs::write(path, hex::encode(secret))
            .wrap_err_with(|| format!("failed to write password file {}", path.display()))?;
        restrict_permissions(path)?;
        info!(path = %path.display(), "generated keystore password");
    }

    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read password file {}", path.display()))?;
    Ok(content.trim().to_string())
}

fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    if path.exists() {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Wallet serving keys unlocked from a [`FileKeystore`].
///
/// Keys stay decrypted in memory until [`Wallet::shutdown`], which drops them and locks the
/// wallet.
#[derive(Debug, Default)]
pub struct KeystoreWallet {
    keys: RwLock<HashMap<KeyHash, IdentityKey>>,
    locked: AtomicBool,
}

impl KeystoreWallet {
    /// Unlock the identity key in `keystore`, creating it if absent.
    pub fn open(keystore: &FileKeystore, password: &str) -> Result<Self> {
        let key = keystore.load_or_create(IDENTITY_KEY_NAME, password)?;
        Ok(Self::from_key(key))
    }

    /// A wallet around one already unlocked key.
    pub fn from_key(key: IdentityKey) -> Self {
        let wallet = Self::default();
        wallet.keys.write().insert(key.key_hash(), key);
        wallet
    }

    /// Addresses of all unlocked keys.
    pub fn addresses(&self) -> Vec<KeyHash> {
        self.keys.read().keys().copied().collect()
    }
}

#[async_trait]
impl Wallet for KeystoreWallet {
    fn managed_key(&self, address: &KeyHash) -> Result<Box<dyn ManagedKey>, WalletError> {
        if self.locked.load(Ordering::Acquire) {
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
        self.locked.store(true, Ordering::Release);
        let dropped = std::mem::take(&mut *self.keys.write()).len();
        debug!(keys = dropped, "keystore wallet locked");
        Ok(())
    }
}
