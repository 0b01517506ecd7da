//! Mutual authentication for byte-stream transports.
//!
//! Each side sends a hello carrying its compressed public key and a fresh 32-byte nonce, then a
//! proof: a recoverable signature over `keccak256(domain || own key || peer nonce)`. A proof is
//! accepted only if it recovers to the key announced in the hello.
//!
//! ```text
//! initiator                     responder
//!   hello(key_i, nonce_i)  ──►
//!                          ◄──  hello(key_r, nonce_r)
//!   proof_i(nonce_r)       ──►
//!                          ◄──  proof_r(nonce_i)
//! ```

use std::time::Duration;

use alloy_primitives::{B256, Signature, keccak256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    HandshakeError, IdentityKey, PublicKey, RemoteIdentity,
    identity::{PUBLIC_KEY_LEN, recover_public_key},
};

const DOMAIN: &[u8] = b"ember-handshake-v1";
const NONCE_LEN: usize = 32;
const HELLO_LEN: usize = PUBLIC_KEY_LEN + NONCE_LEN;
const PROOF_LEN: usize = 65;

/// Authenticate the dialed side of `stream` as `remote`.
pub(crate) async fn initiate<S>(
    stream: &mut S,
    identity: &IdentityKey,
    remote: &RemoteIdentity,
    timeout: Duration,
) -> Result<PublicKey, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    tokio::time::timeout(timeout, async {
        let nonce = new_nonce();
        write_hello(stream, identity.public_key(), &nonce).await?;

        let (remote_key, remote_nonce) = read_hello(stream).await?;
        if !remote.matches(&remote_key) {
            return Err(HandshakeError::IdentityMismatch {
                expected: *remote,
                actual: remote_key,
            });
        }

        write_proof(stream, identity, &remote_nonce).await?;
        read_proof(stream, &remote_key, &nonce).await?;
        Ok(remote_key)
    })
    .await
    .map_err(|_| HandshakeError::Timeout(timeout))?
}

/// Authenticate whoever dialed `stream`.
pub(crate) async fn respond<S>(
    stream: &mut S,
    identity: &IdentityKey,
    timeout: Duration,
) -> Result<PublicKey, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    tokio::time::timeout(timeout, async {
        let nonce = new_nonce();
        let (remote_key, remote_nonce) = read_hello(stream).await?;
        write_hello(stream, identity.public_key(), &nonce).await?;

        read_proof(stream, &remote_key, &nonce).await?;
        write_proof(stream, identity, &remote_nonce).await?;
        Ok(remote_key)
    })
    .await
    .map_err(|_| HandshakeError::Timeout(timeout))?
}

fn new_nonce() -> B256 {
    B256::from(rand_08::random::<[u8; NONCE_LEN]>())
}

fn proof_digest(signer: &PublicKey, verifier_nonce: &B256) -> B256 {
    let mut preimage = Vec::with_capacity(DOMAIN.len() + PUBLIC_KEY_LEN + NONCE_LEN);
    preimage.extend_from_slice(DOMAIN);
    preimage.extend_from_slice(signer.as_bytes());
    preimage.extend_from_slice(verifier_nonce.as_slice());
    keccak256(preimage)
}

async fn write_hello<S>(stream: &mut S, key: &PublicKey, nonce: &B256) -> Result<(), HandshakeError>
where
    S: AsyncWrite + Unpin,
{
    let mut hello = Vec::with_capacity(HELLO_LEN);
    hello.extend_from_slice(key.as_bytes());
    hello.extend_from_slice(nonce.as_slice());
    stream.write_all(&hello).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_hello<S>(stream: &mut S) -> Result<(PublicKey, B256), HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut hello = [0u8; HELLO_LEN];
    stream.read_exact(&mut hello).await?;
    let (key, nonce) = hello.split_at(PUBLIC_KEY_LEN);
    Ok((PublicKey::from_slice(key)?, B256::from_slice(nonce)))
}

async fn write_proof<S>(
    stream: &mut S,
    identity: &IdentityKey,
    peer_nonce: &B256,
) -> Result<(), HandshakeError>
where
    S: AsyncWrite + Unpin,
{
    let signature = identity.sign_hash(&proof_digest(identity.public_key(), peer_nonce))?;
    stream.write_all(&signature.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_proof<S>(
    stream: &mut S,
    remote_key: &PublicKey,
    own_nonce: &B256,
) -> Result<(), HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut proof = [0u8; PROOF_LEN];
    stream.read_exact(&mut proof).await?;
    let signature = Signature::from_raw_array(&proof).map_err(|_| HandshakeError::InvalidProof)?;
    let signer = recover_public_key(&signature, &proof_digest(remote_key, own_nonce))
        .map_err(|_| HandshakeError::InvalidProof)?;
    if &signer != remote_key {
        return Err(HandshakeError::InvalidProof);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_mutual_authentication() {
        let alice = IdentityKey::random().unwrap();
        let bob = IdentityKey::random().unwrap();
        let (mut a, mut b) = tokio::io::duplex(1024);

        let expected = RemoteIdentity::PubKey(*bob.public_key());
        let (dialed, accepted) = tokio::join!(
            initiate(&mut a, &alice, &expected, TIMEOUT),
            respond(&mut b, &bob, TIMEOUT),
        );

        assert_eq!(&dialed.unwrap(), bob.public_key());
        assert_eq!(&accepted.unwrap(), alice.public_key());
    }

    #[tokio::test]
    async fn test_key_hash_is_enough_to_dial() {
        let alice = IdentityKey::random().unwrap();
        let bob = IdentityKey::random().unwrap();
        let (mut a, mut b) = tokio::io::duplex(1024);

        let expected = RemoteIdentity::KeyHash(bob.key_hash());
        let (dialed, accepted) = tokio::join!(
            initiate(&mut a, &alice, &expected, TIMEOUT),
            respond(&mut b, &bob, TIMEOUT),
        );

        assert_eq!(&dialed.unwrap(), bob.public_key());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_identity_mismatch_aborts_dial() {
        let alice = IdentityKey::random().unwrap();
        let bob = IdentityKey::random().unwrap();
        let carol = IdentityKey::random().unwrap();
        let (mut a, mut b) = tokio::io::duplex(1024);

        let expected = RemoteIdentity::PubKey(*carol.public_key());
        let dial = async {
            let result = initiate(&mut a, &alice, &expected, TIMEOUT).await;
            drop(a);
            result
        };
        let (dialed, accepted) = tokio::join!(dial, respond(&mut b, &bob, TIMEOUT));

        assert_matches!(
            dialed,
            Err(HandshakeError::IdentityMismatch { actual, .. }) if &actual == bob.public_key()
        );
        assert_matches!(accepted, Err(HandshakeError::Io(_)));
    }

    #[tokio::test]
    async fn test_forged_proof_rejected() {
        let victim = IdentityKey::random().unwrap();
        let attacker = IdentityKey::random().unwrap();
        let responder = IdentityKey::random().unwrap();
        let (mut a, mut b) = tokio::io::duplex(1024);

        // Claim the victim's key but sign with the attacker's.
        let forge = async {
            write_hello(&mut a, victim.public_key(), &new_nonce()).await?;
            let (_, responder_nonce) = read_hello(&mut a).await?;
            write_proof(&mut a, &attacker, &responder_nonce).await
        };
        let (forged, accepted) = tokio::join!(forge, respond(&mut b, &responder, TIMEOUT));

        forged.unwrap();
        assert_matches!(accepted, Err(HandshakeError::InvalidProof));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let alice = IdentityKey::random().unwrap();
        let (_a, mut b) = tokio::io::duplex(1024);

        let timeout = Duration::from_millis(50);
        let result = respond(&mut b, &alice, timeout).await;
        assert_matches!(result, Err(HandshakeError::Timeout(t)) if t == timeout);
    }
}
