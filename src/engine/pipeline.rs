// src/engine/pipeline.rs

//! One-shot pipeline runs.
//!
//! A [`Pipeline`] owns the definitions registry and the selected target
//! branches. [`Pipeline::run`] performs the whole protocol on a fresh set of
//! instances: connect including relays, fire from the leaves, then wait for
//! the branch under its cumulative timeout.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::ConfigFile;
use crate::engine::report::RunReport;
use crate::errors::Result;
use crate::registry::{Entity, GraphKind, Registry};
use crate::task::{ExecutionContext, TaskDefinition, TaskName};

/// What a run would do, computed without executing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Every task that will be connected, in connection order.
    pub order: Vec<TaskName>,
    /// Leaves in fire order (async first).
    pub leaves: Vec<TaskName>,
    /// Upper bound the run waits for.
    pub timeout: Duration,
}

#[derive(Debug, Default)]
pub struct Pipeline {
    definitions: Registry<TaskDefinition>,
    targets: Vec<TaskName>,
}

impl Pipeline {
    pub fn new(definitions: Registry<TaskDefinition>) -> Self {
        Self {
            definitions,
            targets: Vec::new(),
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(cfg.definitions())
    }

    /// Restrict runs to the branches ending in `targets`. No targets means
    /// the whole pipeline.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn definitions(&self) -> &Registry<TaskDefinition> {
        &self.definitions
    }

    pub fn targets(&self) -> &[TaskName] {
        &self.targets
    }

    /// Label used in logs and timeout errors.
    pub fn branch_label(&self) -> String {
        if self.targets.is_empty() {
            "*".to_string()
        } else {
            self.targets.join(",")
        }
    }

    pub fn plan(&self) -> Result<Plan> {
        let order = self
            .definitions
            .sorted_names(GraphKind::Connections, &self.targets)?;

        let mut leaves: Vec<&TaskDefinition> = self
            .definitions
            .sorted(GraphKind::Dependencies, &order)?
            .into_iter()
            .filter(|def| def.is_leaf())
            .collect();
        leaves.sort_by_key(|def| !def.is_async());

        let timeout = self.definitions.cumulative_timeout_of(&self.targets)?;

        Ok(Plan {
            order,
            leaves: leaves.into_iter().map(|def| def.name().to_string()).collect(),
            timeout,
        })
    }

    /// Instantiate, wire and fire the selected branches, then wait for them.
    ///
    /// Sync leaves run inline before the wait starts. The wait is bounded by
    /// the plan's timeout; tasks still running at that point are left to the
    /// runtime and reported as not terminal.
    pub async fn run(&self, context: &ExecutionContext) -> Result<RunReport> {
        let plan = self.plan()?;
        let branch = self.branch_label();
        info!(%branch, tasks = plan.order.len(), timeout = ?plan.timeout, "starting pipeline run");

        let mut instances = self.definitions.instances(context);
        instances.connect_including_betweens(&self.targets)?;
        let done = instances.wait_for(&self.targets)?;

        let fire_errors: Vec<String> = instances
            .fire_from_edges(&plan.order)?
            .into_iter()
            .filter_map(|result| result.err().map(|err| err.to_string()))
            .collect();

        let timed_out = match tokio::time::timeout(plan.timeout, done).await {
            Ok(_) => false,
            Err(_) => {
                warn!(%branch, timeout = ?plan.timeout, "pipeline did not finish in time");
                true
            }
        };

        let states = instances.states_of(&self.targets)?;
        let mut report = RunReport::new(branch, plan.timeout, states, fire_errors, timed_out);
        for name in plan.order.iter() {
            if let Some(instance) = instances.get(name) {
                report.record_cell(instance.cell());
            }
        }

        info!(succeeded = report.succeeded(), "pipeline run finished");
        Ok(report)
    }
}
