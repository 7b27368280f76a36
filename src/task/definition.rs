// src/task/definition.rs

use std::future::Future;
use std::time::Duration;

use indexmap::IndexSet;

use crate::task::action::{TaskBody, TaskInput};
use crate::task::instance::TaskInstance;
use crate::task::state::{TaskKind, TaskName};

/// Declarative description of a task: its name, what it waits for, what it
/// is wired to, and the body every instance will run.
///
/// `connections` always contains `dependencies`; the extra members are relay
/// nodes that are wired by `connect_including_betweens` but not waited on.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    name: TaskName,
    dependencies: IndexSet<TaskName>,
    connections: IndexSet<TaskName>,
    body: TaskBody,
}

impl TaskDefinition {
    pub fn new(name: impl Into<TaskName>, body: TaskBody) -> Self {
        Self {
            name: name.into(),
            dependencies: IndexSet::new(),
            connections: IndexSet::new(),
            body,
        }
    }

    /// Synchronous task running `f` inline when fired.
    pub fn sync<F>(name: impl Into<TaskName>, f: F) -> Self
    where
        F: Fn(&TaskInput) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self::new(name, TaskBody::blocking(f))
    }

    /// Asynchronous task running the future returned by `f`, bounded by
    /// `timeout`.
    pub fn asynchronous<F, Fut>(name: impl Into<TaskName>, timeout: Duration, f: F) -> Self
    where
        F: Fn(TaskInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        Self::new(name, TaskBody::future(f, timeout))
    }

    /// Add a hard prerequisite.
    pub fn after(mut self, dependency: impl Into<TaskName>) -> Self {
        let dependency = dependency.into();
        self.connections.insert(dependency.clone());
        self.dependencies.insert(dependency);
        self
    }

    pub fn after_all<I, S>(self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        dependencies.into_iter().fold(self, |def, dep| def.after(dep))
    }

    /// Add a relay connection: wired, but not a prerequisite.
    pub fn through(mut self, relay: impl Into<TaskName>) -> Self {
        self.connections.insert(relay.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &IndexSet<TaskName> {
        &self.dependencies
    }

    pub fn connections(&self) -> &IndexSet<TaskName> {
        &self.connections
    }

    pub fn body(&self) -> &TaskBody {
        &self.body
    }

    pub fn kind(&self) -> TaskKind {
        self.body.kind()
    }

    pub(crate) fn add_dependency(&mut self, dependency: &str) -> bool {
        self.connections.insert(dependency.to_string());
        self.dependencies.insert(dependency.to_string())
    }

    /// Create a fresh, unwired instance of this task.
    pub fn instantiate(&self) -> TaskInstance {
        TaskInstance::new(
            self.name.clone(),
            self.dependencies.clone(),
            self.connections.clone(),
            self.body.clone(),
        )
    }
}
