// src/task/context.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::runtime::Handle;

use crate::errors::Result;

/// Per-execution context handed to every instance when it is created.
///
/// Holds the runtime that async tasks and dataflow waiters are spawned on,
/// plus free-form variables made available to task bodies.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    runtime: Handle,
    vars: Arc<BTreeMap<String, String>>,
}

impl ExecutionContext {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            vars: Arc::default(),
        }
    }

    /// Context bound to the runtime the caller is running on.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| anyhow!("no tokio runtime available for execution context: {e}"))?;
        Ok(Self::new(handle))
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.vars).insert(key.into(), value.into());
        self
    }

    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Arc::make_mut(&mut self.vars).extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn vars(&self) -> &Arc<BTreeMap<String, String>> {
        &self.vars
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}
