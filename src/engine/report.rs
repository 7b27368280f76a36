// src/engine/report.rs

use std::time::Duration;

use anyhow::anyhow;
use indexmap::IndexMap;

use crate::errors::{Result, TaskflowError};
use crate::task::{TaskCell, TaskName, TaskState};

/// Outcome of [`Pipeline::run`](crate::engine::Pipeline::run).
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Branch label the run covered (`*` for everything).
    pub branch: String,
    /// Bound the run waited for.
    pub timeout: Duration,
    /// Final state of every task in the run, in connection order.
    pub states: IndexMap<TaskName, TaskState>,
    /// Outputs of completed tasks.
    pub outputs: IndexMap<TaskName, String>,
    /// Failure reasons of failed tasks.
    pub errors: IndexMap<TaskName, String>,
    /// Leaves that could not be fired at all.
    pub fire_errors: Vec<String>,
    pub timed_out: bool,
}

impl RunReport {
    pub(crate) fn new(
        branch: String,
        timeout: Duration,
        states: IndexMap<TaskName, TaskState>,
        fire_errors: Vec<String>,
        timed_out: bool,
    ) -> Self {
        Self {
            branch,
            timeout,
            states,
            outputs: IndexMap::new(),
            errors: IndexMap::new(),
            fire_errors,
            timed_out,
        }
    }

    pub(crate) fn record_cell(&mut self, cell: &TaskCell) {
        if let Some(output) = cell.output() {
            self.outputs.insert(cell.name().to_string(), output.to_string());
        }
        if let Some(error) = cell.error() {
            self.errors.insert(cell.name().to_string(), error.to_string());
        }
    }

    /// True when every task completed in time and every leaf fired.
    pub fn succeeded(&self) -> bool {
        !self.timed_out
            && self.fire_errors.is_empty()
            && self.states.values().all(|s| *s == TaskState::Completed)
    }

    pub fn failed_tasks(&self) -> Vec<&str> {
        self.tasks_where(|s| s == TaskState::Failed)
    }

    /// Tasks that had not finished when the run stopped waiting.
    pub fn pending_tasks(&self) -> Vec<&str> {
        self.tasks_where(|s| !s.is_terminal())
    }

    fn tasks_where(&self, pred: impl Fn(TaskState) -> bool) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, state)| pred(**state))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Turn an unsuccessful report into an error.
    pub fn into_result(self) -> Result<Self> {
        if self.timed_out {
            return Err(TaskflowError::Timeout {
                branch: self.branch,
                after: self.timeout,
            });
        }
        if !self.succeeded() {
            let mut problems: Vec<String> = self
                .failed_tasks()
                .into_iter()
                .map(|name| match self.errors.get(name) {
                    Some(reason) => format!("{name}: {reason}"),
                    None => name.to_string(),
                })
                .collect();
            problems.extend(self.fire_errors.iter().cloned());
            return Err(TaskflowError::Other(anyhow!(
                "pipeline '{}' failed: {}",
                self.branch,
                problems.join("; ")
            )));
        }
        Ok(self)
    }
}
