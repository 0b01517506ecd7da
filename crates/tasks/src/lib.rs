//! Task management for ember.
//!
//! A [`TaskManager`] owns one shutdown [`Signal`] and hands out [`TaskExecutor`]s that spawn
//! onto a tokio runtime. Every task spawned through an executor observes the same signal:
//!
//! - regular and critical tasks are dropped at their next suspension point once it fires;
//! - graceful tasks receive a [`GracefulShutdown`] and decide when to stop, holding a guard
//!   until their cleanup is done.
//!
//! [`TaskExecutor::wait_for_graceful_tasks`] is the join point for the graceful tasks, and the
//! manager itself is a future resolving with a [`PanickedTaskError`] if a critical task panics.

use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    pin::{Pin, pin},
    sync::Arc,
    task::{Context, Poll, ready},
};

use futures_util::{
    FutureExt, TryFutureExt,
    future::{Either, select},
};
use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};
use tracing::{debug, error};
use tracing_futures::Instrument;

use crate::metrics::{TaskExecutorMetrics, TaskKind};

pub mod metrics;
pub mod shutdown;

pub use shutdown::{GracefulShutdown, GracefulShutdownGuard, GracefulTasks, Shutdown, Signal, signal};

/// Owns the shutdown signal of every task spawned through its executors.
#[derive(Debug)]
#[must_use = "TaskManager must be polled to observe critical task panics"]
pub struct TaskManager {
    handle: Handle,
    panicked_tasks_tx: UnboundedSender<PanickedTaskError>,
    panicked_tasks_rx: UnboundedReceiver<PanickedTaskError>,
    signal: Option<Signal>,
    on_shutdown: Shutdown,
    graceful_tasks: Arc<GracefulTasks>,
}

impl TaskManager {
    /// Create a manager on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Create a manager spawning onto `handle`.
    pub fn new(handle: Handle) -> Self {
        let (panicked_tasks_tx, panicked_tasks_rx) = unbounded_channel();
        let (signal, on_shutdown) = signal();
        Self {
            handle,
            panicked_tasks_tx,
            panicked_tasks_rx,
            signal: Some(signal),
            on_shutdown,
            graceful_tasks: Arc::new(GracefulTasks::default()),
        }
    }

    /// An executor bound to this manager's shutdown signal.
    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            handle: self.handle.clone(),
            on_shutdown: self.on_shutdown.clone(),
            panicked_tasks_tx: self.panicked_tasks_tx.clone(),
            metrics: TaskExecutorMetrics::default(),
            graceful_tasks: Arc::clone(&self.graceful_tasks),
        }
    }

    /// Fire the shutdown signal. Returns `false` if it was already fired.
    pub fn fire_shutdown_signal(&mut self) -> bool {
        match self.signal.take() {
            Some(signal) => {
                debug!("firing shutdown signal");
                signal.fire();
                true
            }
            None => false,
        }
    }

    /// Fire the shutdown signal and wait for every graceful task to release its guard.
    pub async fn graceful_shutdown(mut self) {
        self.fire_shutdown_signal();
        self.graceful_tasks.wait_idle().await;
        debug!("gracefully shut down");
    }
}

impl Future for TaskManager {
    type Output = Result<(), PanickedTaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(self.panicked_tasks_rx.poll_recv(cx)) {
            Some(err) => Poll::Ready(Err(err)),
            None => Poll::Ready(Ok(())),
        }
    }
}

/// A critical task panicked.
#[derive(Debug, thiserror::Error)]
#[error("critical task `{task_name}` panicked: `{}`", .error.as_deref().unwrap_or("unknown"))]
pub struct PanickedTaskError {
    task_name: &'static str,
    error: Option<String>,
}

impl PanickedTaskError {
    fn new(task_name: &'static str, error: Box<dyn Any + Send>) -> Self {
        let error = match error.downcast::<String>() {
            Ok(value) => Some(*value),
            Err(error) => error.downcast::<&str>().ok().map(|s| s.to_string()),
        };
        Self { task_name, error }
    }

    /// Name of the task that panicked.
    pub fn task_name(&self) -> &'static str {
        self.task_name
    }
}

/// Spawns tasks bound to a [`TaskManager`]'s shutdown signal.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    handle: Handle,
    on_shutdown: Shutdown,
    panicked_tasks_tx: UnboundedSender<PanickedTaskError>,
    metrics: TaskExecutorMetrics,
    graceful_tasks: Arc<GracefulTasks>,
}

impl TaskExecutor {
    /// The runtime handle tasks are spawned onto.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// The shutdown signal shared by all tasks of this executor.
    pub fn on_shutdown_signal(&self) -> &Shutdown {
        &self.on_shutdown
    }

    /// Spawn a task that is dropped once the shutdown signal fires.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let on_shutdown = self.on_shutdown.clone();
        let finished = self.metrics.spawned(TaskKind::Regular);

        let task = async move {
            let _finished = finished;
            let fut = pin!(fut);
            let _ = select(on_shutdown, fut).await;
        }
        .in_current_span();

        self.handle.spawn(task)
    }

    /// Spawn a task whose panic is reported through the [`TaskManager`] future.
    pub fn spawn_critical<F>(&self, name: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let on_shutdown = self.on_shutdown.clone();
        let finished = self.metrics.spawned(TaskKind::Critical);
        let task = self.catch_panic(name, fut);

        let task = async move {
            let _finished = finished;
            let task = pin!(task);
            let _ = select(on_shutdown, task).await;
        }
        .in_current_span();

        self.handle.spawn(task)
    }

    /// Spawn a task that is handed a [`GracefulShutdown`] and counted by the join point
    /// until it releases the guard.
    pub fn spawn_with_graceful_shutdown_signal<F>(
        &self,
        name: &'static str,
        f: impl FnOnce(GracefulShutdown) -> F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let fut = f(self.graceful_shutdown());
        let finished = self.metrics.spawned(TaskKind::Graceful);

        let task = async move {
            let _finished = finished;
            fut.await;
            debug!(task = name, "graceful task finished");
        }
        .in_current_span();

        self.handle.spawn(task)
    }

    /// [`spawn_with_graceful_shutdown_signal`](Self::spawn_with_graceful_shutdown_signal) with
    /// panics reported like [`spawn_critical`](Self::spawn_critical).
    pub fn spawn_critical_with_graceful_shutdown_signal<F>(
        &self,
        name: &'static str,
        f: impl FnOnce(GracefulShutdown) -> F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let fut = f(self.graceful_shutdown());
        let finished = self.metrics.spawned(TaskKind::Critical);
        let task = self.catch_panic(name, fut);

        let task = async move {
            let _finished = finished;
            let _ = task.await;
            debug!(task = name, "critical graceful task finished");
        }
        .in_current_span();

        self.handle.spawn(task)
    }

    /// Resolves once every graceful task spawned through this manager has released its guard.
    pub async fn wait_for_graceful_tasks(&self) {
        self.graceful_tasks.wait_idle().await;
    }

    /// Number of graceful tasks still holding a guard.
    pub fn graceful_tasks(&self) -> usize {
        self.graceful_tasks.active()
    }

    fn graceful_shutdown(&self) -> GracefulShutdown {
        GracefulShutdown::new(
            self.on_shutdown.clone(),
            GracefulShutdownGuard::new(Arc::clone(&self.graceful_tasks)),
        )
    }

    fn catch_panic<F>(
        &self,
        name: &'static str,
        fut: F,
    ) -> impl Future<Output = Result<(), ()>> + Send + 'static
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let panicked_tasks_tx = self.panicked_tasks_tx.clone();
        AssertUnwindSafe(fut).catch_unwind().map_err(move |error| {
            let task_error = PanickedTaskError::new(name, error);
            error!("{task_error}");
            let _ = panicked_tasks_tx.send(task_error);
        })
    }
}

/// Races `fut` against `shutdown`, returning `None` if the signal fired first.
pub async fn or_shutdown<F>(fut: F, shutdown: Shutdown) -> Option<F::Output>
where
    F: Future,
{
    let fut = pin!(fut);
    match select(fut, shutdown).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(((), _)) => None,
    }
}
