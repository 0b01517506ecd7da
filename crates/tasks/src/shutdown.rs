//! Shutdown signalling.
//!
//! A [`Signal`] is fired exactly once; every clone of the matching [`Shutdown`] resolves when it
//! is fired or dropped. [`GracefulShutdown`] additionally hands out a guard which keeps the
//! owning task counted in [`GracefulTasks`] until the task is done with its cleanup.

use std::{
    future::Future,
    pin::{Pin, pin},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll, ready},
};

use futures_util::{
    FutureExt,
    future::{FusedFuture, Shared},
};
use tokio::sync::{Notify, oneshot};

/// A future that resolves when the shutdown signal has been fired.
#[derive(Debug, Clone)]
#[must_use = "futures do nothing unless polled"]
pub struct Shutdown(Shared<oneshot::Receiver<()>>);

impl Future for Shutdown {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let pin = self.get_mut();
        if pin.0.is_terminated() || pin.0.poll_unpin(cx).is_ready() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Fires the shutdown signal. Dropping it without firing has the same effect.
#[derive(Debug)]
pub struct Signal(oneshot::Sender<()>);

impl Signal {
    /// Fire the signal, consuming it.
    pub fn fire(self) {
        let _ = self.0.send(());
    }
}

/// Create a new connected `(Signal, Shutdown)` pair.
pub fn signal() -> (Signal, Shutdown) {
    let (sender, receiver) = oneshot::channel();
    (Signal(sender), Shutdown(receiver.shared()))
}

/// Count of tasks that still hold a [`GracefulShutdownGuard`].
#[derive(Debug, Default)]
pub struct GracefulTasks {
    active: AtomicUsize,
    idle: Notify,
}

impl GracefulTasks {
    /// Number of tasks currently holding a guard.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Resolves once no task holds a guard.
    ///
    /// Resolves immediately if nothing was ever registered.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn enter(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    fn exit(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Keeps its task registered in [`GracefulTasks`] until dropped.
#[derive(Debug)]
#[must_use = "if unused the graceful shutdown completes immediately"]
pub struct GracefulShutdownGuard(Arc<GracefulTasks>);

impl GracefulShutdownGuard {
    pub(crate) fn new(tasks: Arc<GracefulTasks>) -> Self {
        tasks.enter();
        Self(tasks)
    }
}

impl Drop for GracefulShutdownGuard {
    fn drop(&mut self) {
        self.0.exit();
    }
}

/// A [`Shutdown`] that yields a [`GracefulShutdownGuard`] when it fires.
///
/// The task keeps the guard alive while it cleans up; the join point completes once every
/// guard is gone.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct GracefulShutdown {
    shutdown: Shutdown,
    guard: Option<GracefulShutdownGuard>,
}

impl GracefulShutdown {
    pub(crate) fn new(shutdown: Shutdown, guard: GracefulShutdownGuard) -> Self {
        Self {
            shutdown,
            guard: Some(guard),
        }
    }

    /// A plain clone of the underlying shutdown signal. Awaiting it does not release the guard.
    pub fn signal(&self) -> Shutdown {
        self.shutdown.clone()
    }
}

impl Future for GracefulShutdown {
    type Output = GracefulShutdownGuard;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        ready!(self.shutdown.poll_unpin(cx));
        match self.guard.take() {
            Some(guard) => Poll::Ready(guard),
            // polled after completion
            None => Poll::Pending,
        }
    }
}
