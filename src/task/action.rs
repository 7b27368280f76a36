// src/task/action.rs

//! Task bodies: what a task actually does when it runs.
//!
//! A body is either blocking ([`BlockingAction`]) or future-based
//! ([`AsyncAction`]); the variant decides the task's [`TaskKind`]. Closures
//! implement both traits, and [`ShellCommand`] runs a command through the
//! platform shell in either mode.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::task::state::{TaskKind, TaskName};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Everything a task body receives when it runs.
#[derive(Debug, Clone, Default)]
pub struct TaskInput {
    pub name: TaskName,
    /// Variables of the execution context.
    pub vars: Arc<BTreeMap<String, String>>,
    /// Outputs of the direct prerequisites, in dependency order.
    pub upstream: IndexMap<TaskName, String>,
}

impl TaskInput {
    pub fn upstream(&self, name: &str) -> Option<&str> {
        self.upstream.get(name).map(String::as_str)
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// A body that runs to completion on the calling thread.
pub trait BlockingAction: Send + Sync {
    fn run(&self, input: &TaskInput) -> Result<String>;
}

impl<F> BlockingAction for F
where
    F: Fn(&TaskInput) -> Result<String> + Send + Sync,
{
    fn run(&self, input: &TaskInput) -> Result<String> {
        self(input)
    }
}

/// A body that runs as a future on the execution context's runtime.
pub trait AsyncAction: Send + Sync {
    fn run(&self, input: TaskInput) -> BoxFuture<Result<String>>;
}

impl<F, Fut> AsyncAction for F
where
    F: Fn(TaskInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    fn run(&self, input: TaskInput) -> BoxFuture<Result<String>> {
        Box::pin(self(input))
    }
}

/// Tagged task body. The variant is the task's execution capability.
#[derive(Clone)]
pub enum TaskBody {
    Sync(Arc<dyn BlockingAction>),
    Async {
        action: Arc<dyn AsyncAction>,
        timeout: Duration,
    },
}

impl TaskBody {
    pub fn blocking(action: impl BlockingAction + 'static) -> Self {
        TaskBody::Sync(Arc::new(action))
    }

    pub fn future(action: impl AsyncAction + 'static, timeout: Duration) -> Self {
        TaskBody::Async {
            action: Arc::new(action),
            timeout,
        }
    }

    /// Shell command body; `timeout` selects the async variant.
    pub fn shell(cmd: impl Into<String>, timeout: Option<Duration>) -> Self {
        let cmd = ShellCommand::new(cmd);
        match timeout {
            None => TaskBody::blocking(cmd),
            Some(timeout) => TaskBody::future(cmd, timeout),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            TaskBody::Sync(_) => TaskKind::Sync,
            TaskBody::Async { timeout, .. } => TaskKind::Async { timeout: *timeout },
        }
    }
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskBody::Sync(_) => f.write_str("TaskBody::Sync"),
            TaskBody::Async { timeout, .. } => f
                .debug_struct("TaskBody::Async")
                .field("timeout", timeout)
                .finish_non_exhaustive(),
        }
    }
}

/// Run a command through `sh -c` (or `cmd /C` on Windows).
///
/// Context variables are exported as environment variables and every
/// upstream output is exported as `TASKFLOW_UPSTREAM_<NAME>`. Stdout becomes
/// the task output; a non-zero exit status fails the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    cmd: String,
}

impl ShellCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    fn env(input: &TaskInput) -> Vec<(String, String)> {
        let vars = input.vars.iter().map(|(k, v)| (k.clone(), v.clone()));
        let upstream = input
            .upstream
            .iter()
            .map(|(name, out)| (upstream_env_key(name), out.clone()));
        vars.chain(upstream).collect()
    }

    fn shell_args(&self) -> (&'static str, [&str; 2]) {
        if cfg!(windows) {
            ("cmd", ["/C", self.cmd.as_str()])
        } else {
            ("sh", ["-c", self.cmd.as_str()])
        }
    }
}

fn upstream_env_key(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("TASKFLOW_UPSTREAM_{sanitized}")
}

fn collect_output(task: &str, output: std::process::Output) -> Result<String> {
    let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines() {
        debug!(task = %task, "stderr: {}", line);
    }

    let code = output.status.code().unwrap_or(-1);
    info!(task = %task, exit_code = code, success = output.status.success(), "task process exited");

    if !output.status.success() {
        bail!("command exited with status {code}");
    }
    Ok(stdout)
}

impl BlockingAction for ShellCommand {
    fn run(&self, input: &TaskInput) -> Result<String> {
        let (program, args) = self.shell_args();
        info!(task = %input.name, cmd = %self.cmd, "starting task process");

        let output = std::process::Command::new(program)
            .args(args)
            .envs(Self::env(input))
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawning process for task '{}'", input.name))?;

        collect_output(&input.name, output)
    }
}

impl AsyncAction for ShellCommand {
    fn run(&self, input: TaskInput) -> BoxFuture<Result<String>> {
        let (program, args) = self.shell_args();
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .envs(Self::env(&input))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let shown = self.cmd.clone();

        Box::pin(async move {
            info!(task = %input.name, cmd = %shown, "starting task process");
            let output = cmd
                .output()
                .await
                .with_context(|| format!("spawning process for task '{}'", input.name))?;
            collect_output(&input.name, output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_variant_decides_kind() {
        let sync = TaskBody::blocking(|_: &TaskInput| -> Result<String> { Ok(String::new()) });
        assert_eq!(sync.kind(), TaskKind::Sync);

        let timeout = Duration::from_secs(2);
        let asynchronous = TaskBody::shell("true", Some(timeout));
        assert_eq!(asynchronous.kind(), TaskKind::Async { timeout });
    }

    #[test]
    fn upstream_names_become_env_keys() {
        assert_eq!(upstream_env_key("fetch-data.v2"), "TASKFLOW_UPSTREAM_FETCH_DATA_V2");
    }

    #[cfg(unix)]
    #[test]
    fn blocking_shell_command_captures_stdout() {
        let input = TaskInput {
            name: "echo".into(),
            vars: Arc::new([("WHO".to_string(), "world".to_string())].into_iter().collect()),
            upstream: IndexMap::new(),
        };
        let out = BlockingAction::run(&ShellCommand::new("echo hello $WHO"), &input).unwrap();
        assert_eq!(out, "hello world");
    }

    #[cfg(unix)]
    #[test]
    fn blocking_shell_command_fails_on_exit_status() {
        let input = TaskInput {
            name: "fail".into(),
            ..TaskInput::default()
        };
        assert!(BlockingAction::run(&ShellCommand::new("exit 3"), &input).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn async_shell_command_sees_upstream_output() {
        let mut upstream = IndexMap::new();
        upstream.insert("fetch".to_string(), "42".to_string());
        let input = TaskInput {
            name: "parse".into(),
            vars: Arc::default(),
            upstream,
        };
        let out = AsyncAction::run(&ShellCommand::new("echo got $TASKFLOW_UPSTREAM_FETCH"), input)
            .await
            .unwrap();
        assert_eq!(out, "got 42");
    }
}
