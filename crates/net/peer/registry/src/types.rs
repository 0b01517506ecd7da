use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU32, Ordering},
};

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Identifier of a registered peer, unique among peers registered at the same time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(u32);

impl PeerId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<PeerId> for i64 {
    fn from(id: PeerId) -> Self {
        i64::from(id.0)
    }
}

/// Hands out increasing [`PeerId`]s, shared by every producer of peers.
#[derive(Debug, Default)]
pub struct PeerIdGenerator(AtomicU32);

impl PeerIdGenerator {
    pub fn next(&self) -> PeerId {
        PeerId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which side opened a connection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// On-chain reference to a funded channel: funding transaction id and output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: B256,
    pub index: u32,
}

impl OutPoint {
    pub const fn new(txid: B256, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.index)
    }
}

/// Failure to parse an [`OutPoint`] from `<txid hex>:<index>`.
#[derive(Debug, thiserror::Error)]
pub enum OutPointError {
    #[error("missing ':' between txid and index")]
    MissingSeparator,
    #[error("invalid txid: {0}")]
    InvalidTxid(#[from] hex::FromHexError),
    #[error("txid must be 32 bytes, got {0}")]
    InvalidTxidLength(usize),
    #[error("invalid output index: {0}")]
    InvalidIndex(#[from] std::num::ParseIntError),
}

impl FromStr for OutPoint {
    type Err = OutPointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, index) = s.rsplit_once(':').ok_or(OutPointError::MissingSeparator)?;
        let txid = hex::decode(txid.trim_start_matches("0x"))?;
        if txid.len() != 32 {
            return Err(OutPointError::InvalidTxidLength(txid.len()));
        }
        Ok(Self::new(B256::from_slice(&txid), index.parse()?))
    }
}
