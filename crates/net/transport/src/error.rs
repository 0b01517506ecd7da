//! Transport error types.

use std::{io, time::Duration};

use crate::{PublicKey, RemoteIdentity};

/// Failure to construct or use a node identity.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("signing failed: {0}")]
    Signing(#[from] alloy_signer::Error),
    #[error("signature recovery failed: {0}")]
    Recovery(#[from] alloy_primitives::SignatureError),
}

/// Failure to parse a remote identity or node address.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("missing '@' between identity and endpoint")]
    MissingSeparator,
    #[error("empty endpoint")]
    EmptyEndpoint,
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("identity must be 33 (public key) or 20 (key hash) bytes, got {0}")]
    InvalidLength(usize),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Authentication handshake failure.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("expected remote {expected}, authenticated {actual}")]
    IdentityMismatch {
        expected: RemoteIdentity,
        actual: PublicKey,
    },
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("remote proof does not match its public key")]
    InvalidProof,
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),
    #[error("peer aborted the handshake")]
    Aborted,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Error returned by [`Transport`](crate::Transport) and [`Listener`](crate::Listener).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener was closed; no further connections will be accepted.
    #[error("listener closed")]
    ListenerClosed,
    #[error("address already in use: {0}")]
    AddressInUse(String),
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the error ends an accept loop rather than a single attempt.
    pub fn is_listener_closed(&self) -> bool {
        matches!(self, Self::ListenerClosed)
    }
}
