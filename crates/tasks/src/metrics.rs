//! Task executor metrics.

use core::fmt;
use metrics::Counter;

/// Spawn/finish counters, one pair per task kind.
#[derive(Clone, Debug)]
pub struct TaskExecutorMetrics {
    pub(crate) critical_spawned: Counter,
    pub(crate) critical_finished: Counter,
    pub(crate) regular_spawned: Counter,
    pub(crate) regular_finished: Counter,
    pub(crate) graceful_spawned: Counter,
    pub(crate) graceful_finished: Counter,
}

impl Default for TaskExecutorMetrics {
    fn default() -> Self {
        Self {
            critical_spawned: metrics::counter!("executor.critical.spawned_total"),
            critical_finished: metrics::counter!("executor.critical.finished_total"),
            regular_spawned: metrics::counter!("executor.regular.spawned_total"),
            regular_finished: metrics::counter!("executor.regular.finished_total"),
            graceful_spawned: metrics::counter!("executor.graceful.spawned_total"),
            graceful_finished: metrics::counter!("executor.graceful.finished_total"),
        }
    }
}

impl TaskExecutorMetrics {
    /// Count a spawn and return the guard that counts the matching finish.
    pub(crate) fn spawned(&self, kind: TaskKind) -> IncCounterOnDrop {
        let (spawned, finished) = match kind {
            TaskKind::Critical => (&self.critical_spawned, &self.critical_finished),
            TaskKind::Regular => (&self.regular_spawned, &self.regular_finished),
            TaskKind::Graceful => (&self.graceful_spawned, &self.graceful_finished),
        };
        spawned.increment(1);
        IncCounterOnDrop::new(finished.clone())
    }
}

/// The kind of a spawned task, for metric bucketing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Critical,
    Regular,
    Graceful,
}

/// Increments its counter when dropped, so a finished count is recorded even if the task panics.
pub struct IncCounterOnDrop(Counter);

impl fmt::Debug for IncCounterOnDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IncCounterOnDrop").finish()
    }
}

impl IncCounterOnDrop {
    /// Wrap `counter`.
    pub const fn new(counter: Counter) -> Self {
        Self(counter)
    }
}

impl Drop for IncCounterOnDrop {
    fn drop(&mut self) {
        self.0.increment(1);
    }
}
