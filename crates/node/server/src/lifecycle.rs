use std::sync::Arc;

use tokio::sync::watch;

/// Server lifecycle. Advances only forward: `Created → Running → Stopping → Stopped`, with stop
/// also allowed straight from `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LifecycleState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// Shared, observable [`LifecycleState`] with compare-and-set transitions.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle(Arc<watch::Sender<LifecycleState>>);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(Arc::new(watch::Sender::new(LifecycleState::Created)))
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.0.borrow()
    }

    /// Move to `to` if the current state is one of `from`. Returns whether it moved.
    pub(crate) fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> bool {
        self.0.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Teardown has begun or finished.
    pub(crate) fn is_stopping(&self) -> bool {
        matches!(self.state(), LifecycleState::Stopping | LifecycleState::Stopped)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.0.subscribe()
    }

    /// Resolves once the state is `Stopped`.
    pub(crate) async fn stopped(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|state| *state == LifecycleState::Stopped).await;
    }
}
