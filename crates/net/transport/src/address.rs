//! `<identity>@<endpoint>` node addresses.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{AddressError, PublicKey, RemoteIdentity};

/// A reachable node: who it is and where to dial it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    identity: RemoteIdentity,
    endpoint: String,
}

impl NodeAddress {
    pub fn new(identity: impl Into<RemoteIdentity>, endpoint: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn identity(&self) -> &RemoteIdentity {
        &self.identity
    }

    /// Transport-specific endpoint, e.g. `host:port`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The full public key, if the address carries one.
    pub fn public_key(&self) -> Option<&PublicKey> {
        match &self.identity {
            RemoteIdentity::PubKey(key) => Some(key),
            RemoteIdentity::KeyHash(_) => None,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identity, self.endpoint)
    }
}

impl FromStr for NodeAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (identity, endpoint) = s.split_once('@').ok_or(AddressError::MissingSeparator)?;
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(AddressError::EmptyEndpoint);
        }
        Ok(Self::new(identity.trim().parse::<RemoteIdentity>()?, endpoint))
    }
}

impl Serialize for NodeAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdentityKey;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_pubkey_address() {
        let key = *IdentityKey::random().unwrap().public_key();
        let addr: NodeAddress = format!("{key}@127.0.0.1:9735").parse().unwrap();

        assert_eq!(addr.identity(), &RemoteIdentity::PubKey(key));
        assert_eq!(addr.endpoint(), "127.0.0.1:9735");
        assert_eq!(addr.public_key(), Some(&key));
        assert_eq!(addr.to_string(), format!("{key}@127.0.0.1:9735"));
    }

    #[test]
    fn test_parse_key_hash_address() {
        let key = *IdentityKey::random().unwrap().public_key();
        let hash = hex::encode(key.key_hash());
        let addr: NodeAddress = format!("{hash}@node.example:9735").parse().unwrap();

        assert_eq!(addr.identity(), &RemoteIdentity::KeyHash(key.key_hash()));
        assert!(addr.identity().matches(&key));
        assert_eq!(addr.public_key(), None);
    }

    #[test]
    fn test_parse_errors() {
        let key = *IdentityKey::random().unwrap().public_key();

        assert_matches!(key.to_string().parse::<NodeAddress>(), Err(AddressError::MissingSeparator));
        assert_matches!(format!("{key}@").parse::<NodeAddress>(), Err(AddressError::EmptyEndpoint));
        assert_matches!("00@host:1".parse::<NodeAddress>(), Err(AddressError::InvalidLength(1)));
    }
}
