//! Node identities.
//!
//! A node is identified by its compressed secp256k1 public key. The key hash is the 20-byte
//! address derived from that key, and either form can name the remote side of a dial.

use std::{fmt, str::FromStr, sync::Arc};

use alloy_primitives::{Address, B256, Signature};
use alloy_signer::{
    SignerSync,
    k256::ecdsa::{SigningKey, VerifyingKey},
    utils::public_key_to_address,
};
use alloy_signer_local::PrivateKeySigner;

use crate::{AddressError, IdentityError};

/// Length of a compressed public key.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Length of a key hash.
pub const KEY_HASH_LEN: usize = 20;

/// Hash of a public key, used where a shorter identifier suffices.
pub type KeyHash = Address;

/// A validated, compressed secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_LEN],
    key_hash: KeyHash,
}

impl PublicKey {
    /// Parse a SEC1 encoded key. Uncompressed input is accepted and re-encoded compressed.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdentityError> {
        let key = VerifyingKey::from_sec1_bytes(bytes).map_err(|_| IdentityError::InvalidPublicKey)?;
        Self::from_verifying_key(&key)
    }

    pub fn from_verifying_key(key: &VerifyingKey) -> Result<Self, IdentityError> {
        let bytes: [u8; PUBLIC_KEY_LEN] = key
            .to_encoded_point(true)
            .as_bytes()
            .try_into()
            .map_err(|_| IdentityError::InvalidPublicKey)?;
        Ok(Self { bytes, key_hash: public_key_to_address(key) })
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.bytes
    }

    pub fn key_hash(&self) -> KeyHash {
        self.key_hash
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl FromStr for PublicKey {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        Ok(Self::from_slice(&bytes)?)
    }
}

/// The private half of a node identity.
///
/// Cheap to clone; the signer is shared.
#[derive(Clone)]
pub struct IdentityKey {
    signer: Arc<PrivateKeySigner>,
    public_key: PublicKey,
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKey")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl IdentityKey {
    pub fn new(signing_key: SigningKey) -> Result<Self, IdentityError> {
        let public_key = PublicKey::from_verifying_key(signing_key.verifying_key())?;
        Ok(Self {
            signer: Arc::new(PrivateKeySigner::from_signing_key(signing_key)),
            public_key,
        })
    }

    /// Generate a fresh random identity.
    pub fn random() -> Result<Self, IdentityError> {
        Self::new(SigningKey::random(&mut rand_08::thread_rng()))
    }

    /// Load a raw 32-byte secret.
    pub fn from_slice(secret: &[u8]) -> Result<Self, IdentityError> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|_| IdentityError::InvalidPrivateKey)?;
        Self::new(signing_key)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn key_hash(&self) -> KeyHash {
        self.public_key.key_hash()
    }

    pub fn signing_key(&self) -> &SigningKey {
        self.signer.credential()
    }

    /// Sign a 32-byte digest with a recoverable signature.
    pub fn sign_hash(&self, digest: &B256) -> Result<Signature, IdentityError> {
        Ok(self.signer.sign_hash_sync(digest)?)
    }
}

/// Recover the public key that produced `signature` over `digest`.
pub fn recover_public_key(signature: &Signature, digest: &B256) -> Result<PublicKey, IdentityError> {
    let key = signature.recover_from_prehash(digest)?;
    PublicKey::from_verifying_key(&key)
}

/// How the remote side of a dial is named: by full public key or by key hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteIdentity {
    PubKey(PublicKey),
    KeyHash(KeyHash),
}

impl RemoteIdentity {
    /// Whether an authenticated `key` is the node this identity names.
    pub fn matches(&self, key: &PublicKey) -> bool {
        match self {
            Self::PubKey(expected) => expected == key,
            Self::KeyHash(hash) => *hash == key.key_hash(),
        }
    }

    pub fn key_hash(&self) -> KeyHash {
        match self {
            Self::PubKey(key) => key.key_hash(),
            Self::KeyHash(hash) => *hash,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::PubKey(key) => key.as_bytes(),
            Self::KeyHash(hash) => hash.as_slice(),
        }
    }
}

impl From<PublicKey> for RemoteIdentity {
    fn from(key: PublicKey) -> Self {
        Self::PubKey(key)
    }
}

impl fmt::Display for RemoteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl FromStr for RemoteIdentity {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        match bytes.len() {
            PUBLIC_KEY_LEN => Ok(Self::PubKey(PublicKey::from_slice(&bytes)?)),
            KEY_HASH_LEN => Ok(Self::KeyHash(Address::from_slice(&bytes))),
            len => Err(AddressError::InvalidLength(len)),
        }
    }
}
