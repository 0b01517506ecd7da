//! Outbound connection dialing.
//!
//! A [`Dialer`] turns a [`NodeAddress`] into an [`AuthenticatedConnection`]. Each dial is
//!
//! - admitted through a semaphore, capping concurrent attempts at
//!   [`DialerConfig::max_concurrent_dials`];
//! - deduplicated by remote key hash, so a second dial to a node already being dialed fails
//!   fast with [`DialError::AlreadyDialing`];
//! - bounded by [`DialerConfig::dial_timeout`];
//! - abandoned with [`DialError::Cancelled`] when the caller's [`Shutdown`] fires.

use std::{collections::HashSet, sync::Arc, time::Duration};

use ember_net_transport::{
    AuthenticatedConnection, IdentityKey, KeyHash, NodeAddress, Transport, TransportError,
};
use ember_tasks::{Shutdown, or_shutdown};
use metrics::{Counter, Gauge};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

/// Default cap on concurrent outbound dials.
pub const DEFAULT_MAX_CONCURRENT_DIALS: usize = 16;

/// Default deadline for one dial, handshake included.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialerConfig {
    /// Dials allowed past admission at once. Further dials wait for a slot.
    pub max_concurrent_dials: usize,
    /// Deadline for a single admitted dial.
    pub dial_timeout: Duration,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dials: DEFAULT_MAX_CONCURRENT_DIALS,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("already dialing {0}")]
    AlreadyDialing(NodeAddress),
    #[error("dial to {address} timed out after {timeout:?}")]
    Timeout {
        address: NodeAddress,
        timeout: Duration,
    },
    #[error("dial to {0} cancelled by shutdown")]
    Cancelled(NodeAddress),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Clone, Debug)]
struct DialerMetrics {
    attempts: Counter,
    failures: Counter,
    in_flight: Gauge,
}

impl Default for DialerMetrics {
    fn default() -> Self {
        Self {
            attempts: metrics::counter!("dialer.attempts_total"),
            failures: metrics::counter!("dialer.failures_total"),
            in_flight: metrics::gauge!("dialer.in_flight"),
        }
    }
}

/// Dials remote nodes as one local identity.
pub struct Dialer {
    transport: Arc<dyn Transport>,
    identity: IdentityKey,
    config: DialerConfig,
    permits: Semaphore,
    dialing: Mutex<HashSet<KeyHash>>,
    metrics: DialerMetrics,
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .field("dialing", &self.dialing.lock().len())
            .finish_non_exhaustive()
    }
}

impl Dialer {
    pub fn new(transport: Arc<dyn Transport>, identity: IdentityKey, config: DialerConfig) -> Self {
        Self {
            transport,
            identity,
            permits: Semaphore::new(config.max_concurrent_dials.max(1)),
            config,
            dialing: Mutex::new(HashSet::new()),
            metrics: DialerMetrics::default(),
        }
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    /// Number of nodes with a dial in progress, waiting for admission included.
    pub fn in_flight(&self) -> usize {
        self.dialing.lock().len()
    }

    /// Dial `address`, giving up when `shutdown` fires.
    pub async fn dial(
        &self,
        address: &NodeAddress,
        shutdown: Shutdown,
    ) -> Result<AuthenticatedConnection, DialError> {
        let _dialing = self.claim(address)?;
        self.metrics.attempts.increment(1);

        let result = or_shutdown(self.dial_admitted(address), shutdown)
            .await
            .unwrap_or_else(|| Err(DialError::Cancelled(address.clone())));

        match &result {
            Ok(conn) => trace!(%address, remote_key = %conn.remote_key(), "dial succeeded"),
            Err(err) => {
                self.metrics.failures.increment(1);
                debug!(%address, %err, "dial failed");
            }
        }
        result
    }

    async fn dial_admitted(
        &self,
        address: &NodeAddress,
    ) -> Result<AuthenticatedConnection, DialError> {
        // never closed
        let Ok(_permit) = self.permits.acquire().await else {
            return Err(DialError::Cancelled(address.clone()));
        };

        let _in_flight = InFlightGauge::new(self.metrics.in_flight.clone());
        let dial = self.transport.dial(&self.identity, address.endpoint(), address.identity());
        tokio::time::timeout(self.config.dial_timeout, dial)
            .await
            .map_err(|_| DialError::Timeout {
                address: address.clone(),
                timeout: self.config.dial_timeout,
            })?
            .map_err(DialError::from)
    }

    fn claim(&self, address: &NodeAddress) -> Result<DialingGuard<'_>, DialError> {
        let key_hash = address.identity().key_hash();
        if !self.dialing.lock().insert(key_hash) {
            return Err(DialError::AlreadyDialing(address.clone()));
        }
        Ok(DialingGuard {
            dialing: &self.dialing,
            key_hash,
        })
    }
}

/// Holds the in-flight gauge up for the lifetime of an admitted dial.
struct InFlightGauge(Gauge);

impl InFlightGauge {
    fn new(gauge: Gauge) -> Self {
        gauge.increment(1.0);
        Self(gauge)
    }
}

impl Drop for InFlightGauge {
    fn drop(&mut self) {
        self.0.decrement(1.0);
    }
}

/// Releases the in-flight claim on a node when the dial ends, however it ends.
struct DialingGuard<'a> {
    dialing: &'a Mutex<HashSet<KeyHash>>,
    key_hash: KeyHash,
}

impl Drop for DialingGuard<'_> {
    fn drop(&mut self) {
        self.dialing.lock().remove(&self.key_hash);
    }
}
