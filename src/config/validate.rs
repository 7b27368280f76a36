// src/config/validate.rs

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, ConfigSection, RawConfigFile, Settings, TaskConfig, TaskSpec};
use crate::errors::{Result, TaskflowError};
use crate::task::TaskKind;
use crate::types::TaskMode;

const TASK_NAME_PATTERN: &str = r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TaskflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        validate_task_names(&raw)?;
        let settings = validate_global_config(&raw.config)?;
        validate_task_dependencies(&raw)?;
        validate_dag(&raw)?;

        let task = raw
            .task
            .into_iter()
            .map(|(name, task)| {
                let spec = resolve_task(&name, task, &settings)?;
                Ok((name, spec))
            })
            .collect::<Result<IndexMap<_, _>>>()?;

        Ok(ConfigFile::new_unchecked(settings, raw.vars, task))
    }
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskflowError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_names(cfg: &RawConfigFile) -> Result<()> {
    let pattern = Regex::new(TASK_NAME_PATTERN)
        .map_err(|e| TaskflowError::ConfigError(format!("invalid task name pattern: {e}")))?;

    match cfg.task.keys().find(|name| !pattern.is_match(name)) {
        Some(name) => Err(TaskflowError::ConfigError(format!(
            "invalid task name '{name}': names must match {TASK_NAME_PATTERN}"
        ))),
        None => Ok(()),
    }
}

fn duration_field(field: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value).map_err(|e| TaskflowError::ConfigError(format!("{field}: {e}")))
}

fn validate_global_config(section: &ConfigSection) -> Result<Settings> {
    let sync_task_cost = duration_field("[config].sync_task_cost", &section.sync_task_cost)?;
    let default_timeout = duration_field("[config].default_timeout", &section.default_timeout)?;

    if default_timeout.is_zero() {
        return Err(TaskflowError::ConfigError(
            "[config].default_timeout must be greater than zero".to_string(),
        ));
    }

    Ok(Settings {
        sync_task_cost,
        default_timeout,
    })
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        let edges = task
            .after
            .iter()
            .map(|dep| ("after", dep))
            .chain(task.through.iter().map(|relay| ("through", relay)));

        for (field, dep) in edges {
            if dep == name {
                return Err(TaskflowError::ConfigError(format!(
                    "task '{name}' cannot reference itself in `{field}`"
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(TaskflowError::ConfigError(format!(
                    "task '{name}' has unknown dependency '{dep}' in `{field}`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task, over `after` and `through` alike, since
    // relays are wired in topological order as well.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter().chain(task.through.iter()) {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(TaskflowError::CyclicDependency(vec![
            cycle.node_id().to_string(),
        ])),
    }
}

fn resolve_task(name: &str, task: TaskConfig, settings: &Settings) -> Result<TaskSpec> {
    if task.cmd.trim().is_empty() {
        return Err(TaskflowError::ConfigError(format!(
            "task '{name}' has an empty `cmd`"
        )));
    }

    let kind = match (task.mode, task.timeout.as_deref()) {
        (TaskMode::Sync, None) => TaskKind::Sync,
        (TaskMode::Sync, Some(_)) => {
            return Err(TaskflowError::ConfigError(format!(
                "task '{name}' sets `timeout` but is not `mode = \"async\"`"
            )));
        }
        (TaskMode::Async, None) => TaskKind::Async {
            timeout: settings.default_timeout,
        },
        (TaskMode::Async, Some(raw)) => {
            let timeout = duration_field(&format!("task '{name}' timeout"), raw)?;
            if timeout.is_zero() {
                return Err(TaskflowError::ConfigError(format!(
                    "task '{name}' timeout must be greater than zero"
                )));
            }
            TaskKind::Async { timeout }
        }
    };

    Ok(TaskSpec {
        cmd: task.cmd,
        kind,
        after: task.after,
        through: task.through,
    })
}
