// src/errors.rs

//! Crate-wide error type and result alias.

use std::time::Duration;

use thiserror::Error;

use crate::task::{TaskName, TaskState};

#[derive(Error, Debug)]
pub enum TaskflowError {
    #[error("Cycle detected in task graph involving: {}", .0.join(", "))]
    CyclicDependency(Vec<TaskName>),

    #[error("Unknown task '{name}'{}", referenced_by_suffix(.referenced_by))]
    UnknownNode {
        name: TaskName,
        referenced_by: Option<TaskName>,
    },

    #[error("Cannot fire task '{name}' in state {state:?} (expected Ready)")]
    InvalidFire { name: TaskName, state: TaskState },

    #[error("Task '{0}' is not attached to an execution context")]
    MissingContext(TaskName),

    #[error("Branch '{branch}' did not finish within {after:?}")]
    Timeout { branch: String, after: Duration },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskflowError {
    pub(crate) fn unknown(name: impl Into<TaskName>) -> Self {
        TaskflowError::UnknownNode {
            name: name.into(),
            referenced_by: None,
        }
    }

    pub(crate) fn dangling(name: impl Into<TaskName>, referenced_by: impl Into<TaskName>) -> Self {
        TaskflowError::UnknownNode {
            name: name.into(),
            referenced_by: Some(referenced_by.into()),
        }
    }
}

fn referenced_by_suffix(referenced_by: &Option<TaskName>) -> String {
    match referenced_by {
        Some(parent) => format!(" (referenced by '{parent}')"),
        None => String::new(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskflowError>;
