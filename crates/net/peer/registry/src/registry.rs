//! Peer-by-id map with a channel-outpoint index.
//!
//! The registry is plain owned state: a single task holds it and every mutation goes through
//! `&mut self`. Every outpoint entry references a registered id; removing a peer removes its
//! outpoints with it.

use std::collections::HashMap;

use ember_net_transport::{PublicKey, RemoteIdentity};

use crate::{OutPoint, PeerId};

/// What the registry needs to know about a peer.
pub trait RegisteredPeer {
    fn id(&self) -> PeerId;

    /// The authenticated static key of the remote node.
    fn public_key(&self) -> &PublicKey;
}

/// Result of [`PeerRegistry::insert`].
#[derive(Debug, PartialEq, Eq)]
pub enum InsertResult<P> {
    New,
    /// A peer with the same id is already registered; the rejected peer is handed back.
    DuplicateId(P),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),
}

#[derive(Debug)]
pub struct PeerRegistry<P> {
    peers: HashMap<PeerId, P>,
    channels: HashMap<OutPoint, PeerId>,
}

impl<P> Default for PeerRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PeerRegistry<P> {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
            channels: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<&P> {
        self.peers.get(id)
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    /// Registered peers in no particular order.
    pub fn peers(&self) -> impl Iterator<Item = &P> {
        self.peers.values()
    }

    /// Remove a peer and every outpoint indexed to it. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: &PeerId) -> Option<P> {
        let peer = self.peers.remove(id)?;
        self.channels.retain(|_, owner| owner != id);
        Some(peer)
    }

    /// Empty the registry, handing back every peer.
    pub fn drain(&mut self) -> impl Iterator<Item = P> + '_ {
        self.channels.clear();
        self.peers.drain().map(|(_, peer)| peer)
    }

    /// Route `outpoint` to `id`. Returns the previous owner if the outpoint moved.
    pub fn index_channel(
        &mut self,
        outpoint: OutPoint,
        id: PeerId,
    ) -> Result<Option<PeerId>, RegistryError> {
        if !self.peers.contains_key(&id) {
            return Err(RegistryError::UnknownPeer(id));
        }
        Ok(self.channels.insert(outpoint, id).filter(|previous| *previous != id))
    }

    /// The peer owning the channel at `outpoint`.
    pub fn channel_peer(&self, outpoint: &OutPoint) -> Option<&P> {
        self.channels.get(outpoint).and_then(|id| self.peers.get(id))
    }

    pub fn channels_of(&self, id: &PeerId) -> Vec<OutPoint> {
        self.channels
            .iter()
            .filter(|(_, owner)| *owner == id)
            .map(|(outpoint, _)| *outpoint)
            .collect()
    }
}

impl<P: RegisteredPeer> PeerRegistry<P> {
    pub fn insert(&mut self, peer: P) -> InsertResult<P> {
        let id = peer.id();
        if self.peers.contains_key(&id) {
            return InsertResult::DuplicateId(peer);
        }
        self.peers.insert(id, peer);
        InsertResult::New
    }

    /// First registered peer authenticated as `remote`.
    ///
    /// Stops at the first match; with several matches, which one is returned is unspecified.
    pub fn find(&self, remote: &RemoteIdentity) -> Option<&P> {
        self.peers.values().find(|peer| remote.matches(peer.public_key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use assert_matches::assert_matches;
    use ember_net_transport::IdentityKey;

    #[derive(Debug, PartialEq, Eq)]
    struct TestPeer {
        id: PeerId,
        key: PublicKey,
    }

    impl RegisteredPeer for TestPeer {
        fn id(&self) -> PeerId {
            self.id
        }

        fn public_key(&self) -> &PublicKey {
            &self.key
        }
    }

    fn test_peer(id: u32) -> TestPeer {
        TestPeer {
            id: PeerId::new(id),
            key: *IdentityKey::random().unwrap().public_key(),
        }
    }

    fn outpoint(n: u8) -> OutPoint {
        OutPoint::new(B256::repeat_byte(n), u32::from(n))
    }

    #[test]
    fn test_registry_basic() {
        let mut registry = PeerRegistry::new();
        assert!(registry.is_empty());

        let peer = test_peer(1);
        let key = peer.key;
        assert_eq!(registry.insert(peer), InsertResult::New);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&PeerId::new(1)));
        assert_eq!(registry.get(&PeerId::new(1)).map(|p| p.key), Some(key));
        assert_eq!(registry.ids(), vec![PeerId::new(1)]);
    }

    #[test]
    fn test_registry_duplicate_id_rejected() {
        let mut registry = PeerRegistry::new();
        assert_eq!(registry.insert(test_peer(1)), InsertResult::New);

        let again = test_peer(1);
        let key = again.key;
        assert_matches!(registry.insert(again), InsertResult::DuplicateId(p) if p.key == key);
        assert_eq!(registry.len(), 1);
        assert_ne!(registry.get(&PeerId::new(1)).map(|p| p.key), Some(key));
    }

    #[test]
    fn test_registry_remove_is_idempotent() {
        let mut registry = PeerRegistry::new();
        let _ = registry.insert(test_peer(1));

        assert!(registry.remove(&PeerId::new(1)).is_some());
        assert!(registry.remove(&PeerId::new(1)).is_none());
        assert!(registry.remove(&PeerId::new(7)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_find_by_identity() {
        let mut registry = PeerRegistry::new();
        let peer = test_peer(1);
        let key = peer.key;
        let _ = registry.insert(peer);
        let _ = registry.insert(test_peer(2));

        let by_key = registry.find(&RemoteIdentity::PubKey(key)).map(|p| p.id);
        assert_eq!(by_key, Some(PeerId::new(1)));

        let by_hash = registry.find(&RemoteIdentity::KeyHash(key.key_hash())).map(|p| p.id);
        assert_eq!(by_hash, Some(PeerId::new(1)));

        let stranger = *IdentityKey::random().unwrap().public_key();
        assert!(registry.find(&RemoteIdentity::PubKey(stranger)).is_none());
    }

    #[test]
    fn test_registry_channel_index() {
        let mut registry = PeerRegistry::new();
        let _ = registry.insert(test_peer(1));
        let _ = registry.insert(test_peer(2));

        assert_eq!(registry.index_channel(outpoint(1), PeerId::new(1)), Ok(None));
        assert_eq!(registry.index_channel(outpoint(2), PeerId::new(1)), Ok(None));
        assert_eq!(registry.index_channel(outpoint(1), PeerId::new(1)), Ok(None));
        assert_eq!(
            registry.index_channel(outpoint(3), PeerId::new(9)),
            Err(RegistryError::UnknownPeer(PeerId::new(9)))
        );

        assert_eq!(registry.channel_peer(&outpoint(1)).map(|p| p.id), Some(PeerId::new(1)));
        let mut channels = registry.channels_of(&PeerId::new(1));
        channels.sort();
        assert_eq!(channels, vec![outpoint(1), outpoint(2)]);

        // moving a channel reports the previous owner
        assert_eq!(
            registry.index_channel(outpoint(2), PeerId::new(2)),
            Ok(Some(PeerId::new(1)))
        );
        assert_eq!(registry.channels_of(&PeerId::new(1)), vec![outpoint(1)]);
    }

    #[test]
    fn test_registry_remove_drops_outpoints() {
        let mut registry = PeerRegistry::new();
        let _ = registry.insert(test_peer(1));
        let _ = registry.insert(test_peer(2));
        registry.index_channel(outpoint(1), PeerId::new(1)).unwrap();
        registry.index_channel(outpoint(2), PeerId::new(2)).unwrap();

        registry.remove(&PeerId::new(1));
        assert!(registry.channel_peer(&outpoint(1)).is_none());
        assert_eq!(registry.channel_peer(&outpoint(2)).map(|p| p.id), Some(PeerId::new(2)));
    }

    #[test]
    fn test_registry_drain() {
        let mut registry = PeerRegistry::new();
        for i in 1..=5 {
            assert_eq!(registry.insert(test_peer(i)), InsertResult::New);
        }
        registry.index_channel(outpoint(1), PeerId::new(3)).unwrap();

        let mut drained: Vec<_> = registry.drain().map(|p| p.id.get()).collect();
        drained.sort_unstable();
        assert_eq!(drained, vec![1, 2, 3, 4, 5]);
        assert!(registry.is_empty());
        assert!(registry.channel_peer(&outpoint(1)).is_none());
    }

    #[test]
    fn test_registry_counts_match_adds_minus_removes() {
        let mut registry = PeerRegistry::new();
        for i in 0..20 {
            let _ = registry.insert(test_peer(i));
        }
        for i in (0..20).step_by(3) {
            let _ = registry.remove(&PeerId::new(i));
        }
        // removing again changes nothing
        for i in (0..20).step_by(3) {
            let _ = registry.remove(&PeerId::new(i));
        }
        assert_eq!(registry.len(), 20 - 7);
    }
}
