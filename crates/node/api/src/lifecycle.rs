//! Lifecycle hooks of the collaborators the server starts and stops.

use async_trait::async_trait;

/// A collaborator failed to start or stop.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Stop was requested for a component that is not running.
    #[error("{0} is not running")]
    NotRunning(&'static str),
    /// The component reported a failure.
    #[error("{component}: {reason}")]
    Failed {
        /// Component name.
        component: &'static str,
        /// What went wrong.
        reason: String,
    },
}

/// The channel-funding collaborator. Only its lifecycle is driven by the server.
#[async_trait]
pub trait FundingManager: Send + Sync + 'static {
    /// Start processing funding flows.
    async fn start(&self) -> Result<(), LifecycleError>;

    /// Stop processing funding flows.
    async fn stop(&self) -> Result<(), LifecycleError>;
}

/// The external RPC surface. Stopped first during teardown.
#[async_trait]
pub trait RpcService: Send + Sync + 'static {
    /// Stop serving requests.
    async fn stop(&self) -> Result<(), LifecycleError>;
}
