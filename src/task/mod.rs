// src/task/mod.rs

//! Tasks: definitions, runnable instances and their execution state.
//!
//! - [`definition`] describes a task declaratively.
//! - [`instance`] is the runnable unit created from a definition.
//! - [`state`] holds the state machine and the shared [`TaskCell`].
//! - [`action`] contains the task bodies (closures and shell commands).
//! - [`context`] is the per-execution environment instances attach to.

pub mod action;
pub mod context;
pub mod definition;
pub mod instance;
pub mod state;

pub use action::{AsyncAction, BlockingAction, BoxFuture, ShellCommand, TaskBody, TaskInput};
pub use context::ExecutionContext;
pub use definition::TaskDefinition;
pub use instance::{Connected, FireResult, Fired, Siblings, TaskInstance};
pub use state::{Readiness, TaskCell, TaskKind, TaskName, TaskState};
