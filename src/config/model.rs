// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::registry::Registry;
use crate::task::{TaskBody, TaskDefinition, TaskKind};
use crate::types::TaskMode;

/// Pipeline file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// sync_task_cost = "100ms"
/// default_timeout = "30s"
///
/// [vars]
/// GREETING = "hello"
///
/// [task.fetch]
/// cmd = "curl -s example.org"
/// mode = "async"
/// timeout = "5s"
///
/// [task.parse]
/// cmd = "wc -c"
/// after = ["fetch"]
/// ```
///
/// Tasks keep the order they are written in.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Variables exported to every task.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// All tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: IndexMap<String, TaskConfig>,
}

/// `[config]` section. Durations use the `<n>ms|s|m|h` format.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Cost charged for a sync task when summing a branch's timeout.
    #[serde(default = "default_sync_task_cost")]
    pub sync_task_cost: String,

    /// Timeout of async tasks that do not set their own.
    #[serde(default = "default_timeout")]
    pub default_timeout: String,
}

fn default_sync_task_cost() -> String {
    "100ms".to_string()
}

fn default_timeout() -> String {
    "30s".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            sync_task_cost: default_sync_task_cost(),
            default_timeout: default_timeout(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Shell command to run.
    pub cmd: String,

    #[serde(default)]
    pub mode: TaskMode,

    /// Async only; falls back to `[config].default_timeout`.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Hard prerequisites.
    #[serde(default)]
    pub after: Vec<String>,

    /// Relay tasks: wired together with this task but not waited on.
    #[serde(default)]
    pub through: Vec<String>,
}

/// Durations from `[config]`, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub sync_task_cost: Duration,
    pub default_timeout: Duration,
}

/// A validated task with its timeout resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub cmd: String,
    pub kind: TaskKind,
    pub after: Vec<String>,
    pub through: Vec<String>,
}

/// Validated pipeline file. Build one with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: Settings,
    pub vars: BTreeMap<String, String>,
    pub task: IndexMap<String, TaskSpec>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        settings: Settings,
        vars: BTreeMap<String, String>,
        task: IndexMap<String, TaskSpec>,
    ) -> Self {
        Self {
            settings,
            vars,
            task,
        }
    }

    /// One shell-command definition per configured task.
    pub fn definitions(&self) -> Registry<TaskDefinition> {
        self.task
            .iter()
            .map(|(name, spec)| {
                let body = TaskBody::shell(spec.cmd.clone(), spec.kind.timeout());
                spec.through.iter().fold(
                    TaskDefinition::new(name.clone(), body).after_all(spec.after.iter().cloned()),
                    |def, relay| def.through(relay.clone()),
                )
            })
            .collect::<Registry<_>>()
            .with_sync_task_cost(self.settings.sync_task_cost)
    }
}
