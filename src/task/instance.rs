// src/task/instance.rs

//! Runnable task instances.
//!
//! An instance is wired by [`TaskInstance::connect`] and started either by
//! [`TaskInstance::fire`] (leaves) or by its dataflow waiter, a task spawned at
//! connect time that runs the instance as soon as all prerequisites finish.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use indexmap::{IndexMap, IndexSet};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, TaskflowError};
use crate::registry::Registry;
use crate::task::action::{AsyncAction, BlockingAction, TaskBody, TaskInput};
use crate::task::context::ExecutionContext;
use crate::task::state::{TaskCell, TaskKind, TaskName, TaskState};

/// Handles to every instance created alongside this one, keyed by name.
pub type Siblings = Arc<IndexMap<TaskName, Arc<TaskCell>>>;

#[derive(Debug, Default)]
struct Wiring {
    upstream: Vec<Arc<TaskCell>>,
    waiter: Option<JoinHandle<()>>,
}

/// Result of connecting one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connected {
    pub name: TaskName,
    /// Prerequisites the instance is now bound to.
    pub upstream: Vec<TaskName>,
    /// False when the instance had already started and its wiring was kept.
    pub rewired: bool,
}

/// Result of firing one instance.
#[derive(Debug)]
pub enum Fired {
    /// A synchronous task ran inline and finished in `state`.
    Completed { name: TaskName, state: TaskState },
    /// An asynchronous task was spawned; the handle resolves to its final state.
    Spawned {
        name: TaskName,
        handle: JoinHandle<TaskState>,
    },
}

impl Fired {
    pub fn name(&self) -> &str {
        match self {
            Fired::Completed { name, .. } | Fired::Spawned { name, .. } => name,
        }
    }

    /// Wait for the fired task to reach its final state.
    pub async fn wait(self) -> TaskState {
        match self {
            Fired::Completed { state, .. } => state,
            Fired::Spawned { handle, .. } => handle.await.unwrap_or(TaskState::Failed),
        }
    }
}

pub type FireResult = Result<Fired>;

/// A runnable unit produced by [`TaskDefinition::instantiate`].
///
/// [`TaskDefinition::instantiate`]: crate::task::TaskDefinition::instantiate
pub struct TaskInstance {
    name: TaskName,
    dependencies: IndexSet<TaskName>,
    connections: IndexSet<TaskName>,
    body: TaskBody,
    cell: Arc<TaskCell>,
    context: Option<ExecutionContext>,
    siblings: Siblings,
    wiring: Mutex<Wiring>,
}

impl fmt::Debug for TaskInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInstance")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("connections", &self.connections)
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TaskInstance {
    pub(crate) fn new(
        name: TaskName,
        dependencies: IndexSet<TaskName>,
        connections: IndexSet<TaskName>,
        body: TaskBody,
    ) -> Self {
        let cell = TaskCell::new(name.clone());
        Self {
            name,
            dependencies,
            connections,
            body,
            cell,
            context: None,
            siblings: Arc::default(),
            wiring: Mutex::default(),
        }
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

    pub fn kind(&self) -> TaskKind {
        self.body.kind()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.kind().timeout()
    }

    pub fn is_leaf(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    pub fn output(&self) -> Option<&str> {
        self.cell.output()
    }

    pub fn cell(&self) -> &Arc<TaskCell> {
        &self.cell
    }

    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    /// State of a sibling captured at creation time.
    pub fn sibling_state(&self, name: &str) -> Option<TaskState> {
        self.siblings.get(name).map(|cell| cell.state())
    }

    /// Creation hook: capture the execution context and the sibling handles.
    pub fn attach(&mut self, siblings: Siblings, context: &ExecutionContext) {
        debug!(task = %self.name, siblings = siblings.len(), "attaching instance to context");
        self.siblings = siblings;
        self.context = Some(context.clone());
    }

    pub(crate) fn set_siblings(&mut self, siblings: Siblings) {
        self.siblings = siblings;
    }

    /// Add a hard prerequisite. Takes effect on the next `connect`.
    pub(crate) fn add_dependency(&mut self, dependency: &str) -> bool {
        self.connections.insert(dependency.to_string());
        self.dependencies.insert(dependency.to_string())
    }

    /// Bind this instance to its prerequisite instances in `registry`.
    ///
    /// Moves `Unavailable → Ready`. A non-leaf instance also gets a dataflow
    /// waiter that runs it once every prerequisite has finished; connecting
    /// again replaces that waiter. Instances that already started keep their
    /// wiring untouched.
    pub fn connect(&self, registry: &Registry<TaskInstance>) -> Result<Connected> {
        let upstream = self
            .dependencies
            .iter()
            .map(|dep| {
                registry
                    .get(dep)
                    .map(|instance| Arc::clone(instance.cell()))
                    .ok_or_else(|| TaskflowError::dangling(dep.clone(), self.name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let upstream_names: Vec<TaskName> = self.dependencies.iter().cloned().collect();

        let state = self.state();
        if matches!(state, TaskState::Running | TaskState::Completed | TaskState::Failed) {
            debug!(task = %self.name, ?state, "task already started; keeping existing wiring");
            return Ok(Connected {
                name: self.name.clone(),
                upstream: upstream_names,
                rewired: false,
            });
        }

        let runtime = match (&self.context, upstream.is_empty()) {
            (_, true) => None,
            (Some(context), false) => Some(context.runtime()),
            (None, false) => return Err(TaskflowError::MissingContext(self.name.clone())),
        };

        let mut wiring = self.wiring.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = wiring.waiter.take() {
            previous.abort();
        }

        // Ready must be visible before the waiter can try to claim the task.
        self.cell.mark_ready();

        wiring.waiter = runtime.map(|runtime| {
            runtime.spawn(run_when_ready(
                Arc::clone(&self.cell),
                upstream.clone(),
                self.body.clone(),
                self.base_input(),
            ))
        });
        wiring.upstream = upstream;
        drop(wiring);

        debug!(task = %self.name, upstream = ?upstream_names, "task connected");

        Ok(Connected {
            name: self.name.clone(),
            upstream: upstream_names,
            rewired: true,
        })
    }

    /// Start the task now.
    ///
    /// Synchronous tasks run inline and block until done; asynchronous tasks
    /// are spawned on the context's runtime. Firing anything but a `Ready`
    /// instance is an [`TaskflowError::InvalidFire`].
    pub fn fire(&self) -> Result<Fired> {
        if self.kind().is_async() && self.context.is_none() {
            return Err(TaskflowError::MissingContext(self.name.clone()));
        }

        self.cell.claim().map_err(|state| TaskflowError::InvalidFire {
            name: self.name.clone(),
            state,
        })?;

        let input = self.input();

        match &self.body {
            TaskBody::Sync(action) => {
                info!(task = %self.name, "firing synchronous task");
                let state = self.cell.finish(action.run(&input));
                Ok(Fired::Completed {
                    name: self.name.clone(),
                    state,
                })
            }
            TaskBody::Async { action, timeout } => {
                let Some(context) = self.context.as_ref() else {
                    // Checked before claiming; a detached async task never gets here.
                    return Err(TaskflowError::MissingContext(self.name.clone()));
                };
                info!(task = %self.name, ?timeout, "firing asynchronous task");
                let handle = context.runtime().spawn(run_async(
                    Arc::clone(&self.cell),
                    Arc::clone(action),
                    *timeout,
                    input,
                ));
                Ok(Fired::Spawned {
                    name: self.name.clone(),
                    handle,
                })
            }
        }
    }

    fn base_input(&self) -> TaskInput {
        TaskInput {
            name: self.name.clone(),
            vars: self
                .context
                .as_ref()
                .map(|ctx| Arc::clone(ctx.vars()))
                .unwrap_or_default(),
            upstream: IndexMap::new(),
        }
    }

    fn input(&self) -> TaskInput {
        let wiring = self.wiring.lock().unwrap_or_else(PoisonError::into_inner);
        with_upstream_outputs(self.base_input(), &wiring.upstream)
    }
}

impl Drop for TaskInstance {
    fn drop(&mut self) {
        let wiring = self.wiring.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(waiter) = wiring.waiter.take() {
            waiter.abort();
        }
    }
}

fn with_upstream_outputs(mut input: TaskInput, upstream: &[Arc<TaskCell>]) -> TaskInput {
    input.upstream = upstream
        .iter()
        .filter_map(|cell| cell.output().map(|out| (cell.name().to_string(), out.to_string())))
        .collect();
    input
}

/// Dataflow waiter: wait for every prerequisite, then run the task body.
async fn run_when_ready(
    cell: Arc<TaskCell>,
    upstream: Vec<Arc<TaskCell>>,
    body: TaskBody,
    input: TaskInput,
) {
    for dep in &upstream {
        if dep.wait_terminal().await == TaskState::Failed {
            cell.skip(format!("upstream task '{}' failed", dep.name()));
            return;
        }
    }

    if let Err(state) = cell.claim() {
        debug!(task = %cell.name(), ?state, "task no longer Ready; dataflow waiter exiting");
        return;
    }

    // Past the claim the body runs in its own task: aborting this waiter on
    // a reconnect must not leave the cell stuck in Running.
    let input = with_upstream_outputs(input, &upstream);
    let run = tokio::spawn(run_claimed(Arc::clone(&cell), body, input));
    if let Err(join_err) = run.await {
        cell.finish(Err(anyhow!("task body panicked: {join_err}")));
    }
}

async fn run_claimed(cell: Arc<TaskCell>, body: TaskBody, input: TaskInput) -> TaskState {
    match body {
        TaskBody::Sync(action) => run_blocking(cell, action, input).await,
        TaskBody::Async { action, timeout } => run_async(cell, action, timeout, input).await,
    }
}

async fn run_blocking(
    cell: Arc<TaskCell>,
    action: Arc<dyn BlockingAction>,
    input: TaskInput,
) -> TaskState {
    let result = tokio::task::spawn_blocking(move || action.run(&input))
        .await
        .unwrap_or_else(|join_err| Err(anyhow!("task body panicked: {join_err}")));
    cell.finish(result)
}

async fn run_async(
    cell: Arc<TaskCell>,
    action: Arc<dyn AsyncAction>,
    timeout: Duration,
    input: TaskInput,
) -> TaskState {
    let result = match tokio::time::timeout(timeout, action.run(input)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(task = %cell.name(), ?timeout, "task timed out");
            Err(anyhow!("timed out after {timeout:?}"))
        }
    };
    cell.finish(result)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn aborting_a_waiter_after_its_claim_still_finishes_the_task() {
        let upstream = TaskCell::new("A");
        let cell = TaskCell::new("B");
        upstream.mark_ready();
        cell.mark_ready();

        let body = TaskBody::future(
            |_input: TaskInput| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok("done".to_string())
            },
            Duration::from_secs(5),
        );
        let waiter = tokio::spawn(run_when_ready(
            Arc::clone(&cell),
            vec![Arc::clone(&upstream)],
            body,
            TaskInput::default(),
        ));

        upstream.claim().unwrap();
        upstream.finish(Ok("up".into()));

        let mut states = cell.subscribe();
        states
            .wait_for(|state| *state == TaskState::Running)
            .await
            .unwrap();
        waiter.abort();

        let finished = tokio::time::timeout(Duration::from_secs(2), cell.wait_terminal())
            .await
            .unwrap();
        assert_eq!(finished, TaskState::Completed);
        assert_eq!(cell.output(), Some("done"));
    }
}
