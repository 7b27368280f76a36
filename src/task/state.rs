// src/task/state.rs

//! Task states and the shared cell that publishes them.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

/// Execution state of a task instance.
///
/// `Unavailable →(connect)→ Ready →(fire)→ Running → Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Instantiated but not wired yet.
    Unavailable,
    /// Wired to its prerequisites; may be fired.
    Ready,
    Running,
    Completed,
    /// The task itself failed, timed out, or an upstream task failed.
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// What the registry knows about a name, independent of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The name went through the connect protocol.
    Ready,
    /// Stored, but never connected.
    Unavailable,
    /// Not stored at all.
    Missing,
}

/// Execution capability of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Fires inline and blocks the caller until the task finishes.
    Sync,
    /// Fires on the runtime and is bounded by `timeout`.
    Async { timeout: Duration },
}

impl TaskKind {
    pub fn is_async(self) -> bool {
        matches!(self, TaskKind::Async { .. })
    }

    pub fn timeout(self) -> Option<Duration> {
        match self {
            TaskKind::Sync => None,
            TaskKind::Async { timeout } => Some(timeout),
        }
    }
}

/// Observable execution cell of one task instance.
///
/// The cell is shared (`Arc`) between the instance, the dataflow waiters of
/// its dependents and any spawned execution, so that state and output can be
/// read from anywhere without going through the registry.
#[derive(Debug)]
pub struct TaskCell {
    name: TaskName,
    state: watch::Sender<TaskState>,
    output: OnceLock<String>,
    error: OnceLock<String>,
}

impl TaskCell {
    pub fn new(name: impl Into<TaskName>) -> Arc<Self> {
        let (state, _) = watch::channel(TaskState::Unavailable);
        Arc::new(Self {
            name: name.into(),
            state,
            output: OnceLock::new(),
            error: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.state.subscribe()
    }

    /// Output produced by a completed task.
    pub fn output(&self) -> Option<&str> {
        self.output.get().map(String::as_str)
    }

    /// Failure reason of a failed task.
    pub fn error(&self) -> Option<&str> {
        self.error.get().map(String::as_str)
    }

    /// Wait until the task is `Completed` or `Failed`.
    pub async fn wait_terminal(&self) -> TaskState {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            // The sender lives in `self`, so the channel cannot be closed here.
            Err(_) => self.state(),
        }
    }

    /// `Unavailable → Ready`. Returns false if the cell was in any other state.
    pub(crate) fn mark_ready(&self) -> bool {
        self.transition(TaskState::Unavailable, TaskState::Ready)
    }

    /// Atomically claim `Ready → Running`, returning the observed state on
    /// failure.
    pub(crate) fn claim(&self) -> Result<(), TaskState> {
        let mut observed = TaskState::Ready;
        let claimed = self.state.send_if_modified(|s| {
            observed = *s;
            if *s == TaskState::Ready {
                *s = TaskState::Running;
                true
            } else {
                false
            }
        });

        if claimed {
            debug!(task = %self.name, "task claimed; Running");
            Ok(())
        } else {
            Err(observed)
        }
    }

    /// Fail a task that never started (`Ready → Failed`).
    pub(crate) fn skip(&self, reason: String) -> bool {
        if self.transition(TaskState::Ready, TaskState::Failed) {
            warn!(task = %self.name, %reason, "task skipped");
            let _ = self.error.set(reason);
            true
        } else {
            false
        }
    }

    /// Record the outcome of a running task and publish its terminal state.
    pub(crate) fn finish(&self, result: anyhow::Result<String>) -> TaskState {
        let state = match result {
            Ok(output) => {
                let _ = self.output.set(output);
                info!(task = %self.name, "task completed");
                TaskState::Completed
            }
            Err(err) => {
                warn!(task = %self.name, error = %err, "task failed");
                let _ = self.error.set(format!("{err:#}"));
                TaskState::Failed
            }
        };
        self.state.send_replace(state);
        state
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_requires_ready() {
        let cell = TaskCell::new("A");
        assert_eq!(cell.claim(), Err(TaskState::Unavailable));

        assert!(cell.mark_ready());
        assert!(!cell.mark_ready());
        assert_eq!(cell.claim(), Ok(()));
        assert_eq!(cell.state(), TaskState::Running);
        assert_eq!(cell.claim(), Err(TaskState::Running));
    }

    #[test]
    fn finish_records_output_or_error() {
        let ok = TaskCell::new("ok");
        assert_eq!(ok.finish(Ok("done".into())), TaskState::Completed);
        assert_eq!(ok.output(), Some("done"));

        let bad = TaskCell::new("bad");
        assert_eq!(bad.finish(Err(anyhow::anyhow!("boom"))), TaskState::Failed);
        assert_eq!(bad.error(), Some("boom"));
        assert_eq!(bad.output(), None);
    }

    #[test]
    fn skip_only_applies_to_ready_tasks() {
        let cell = TaskCell::new("A");
        assert!(!cell.skip("upstream failed".into()));
        cell.mark_ready();
        assert!(cell.skip("upstream failed".into()));
        assert_eq!(cell.state(), TaskState::Failed);
        assert_eq!(cell.error(), Some("upstream failed"));
    }

    #[tokio::test]
    async fn wait_terminal_sees_later_completion() {
        let cell = TaskCell::new("A");
        cell.mark_ready();
        cell.claim().unwrap();

        let waiter = {
            let cell = Arc::clone(&cell);
            tokio::spawn(async move { cell.wait_terminal().await })
        };
        cell.finish(Ok(String::new()));

        assert_eq!(waiter.await.unwrap(), TaskState::Completed);
    }
}
