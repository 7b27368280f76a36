#![allow(dead_code)]

use std::time::Duration;

use taskflow::config::{ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
use taskflow::registry::Registry;
use taskflow::task::TaskDefinition;
use taskflow::types::TaskMode;

use crate::recorder::Recorder;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                ..RawConfigFile::default()
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.config.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_sync_task_cost(mut self, cost: &str) -> Self {
        self.config.config.sync_task_cost = cost.to_string();
        self
    }

    pub fn with_default_timeout(mut self, timeout: &str) -> Self {
        self.config.config.default_timeout = timeout.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                ..TaskConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn through(mut self, relay: &str) -> Self {
        self.task.through.push(relay.to_string());
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.task.mode = TaskMode::Async;
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for a definitions registry made of [`Recorder`] tasks.
pub struct PipelineBuilder {
    recorder: Recorder,
    definitions: Vec<TaskDefinition>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            recorder: Recorder::new(),
            definitions: Vec::new(),
        }
    }

    fn push(mut self, definition: TaskDefinition, after: &[&str]) -> Self {
        let definition = after.iter().fold(definition, |def, dep| def.after(*dep));
        self.definitions.push(definition);
        self
    }

    pub fn sync(self, name: &str, after: &[&str]) -> Self {
        let def = self.recorder.sync_task(name);
        self.push(def, after)
    }

    pub fn failing(self, name: &str, after: &[&str]) -> Self {
        let def = self.recorder.failing_task(name);
        self.push(def, after)
    }

    pub fn asynchronous(self, name: &str, timeout: Duration, after: &[&str]) -> Self {
        let def = self.recorder.async_task(name, timeout, Duration::ZERO);
        self.push(def, after)
    }

    /// Async task that sleeps for `delay` before completing.
    pub fn slow(self, name: &str, timeout: Duration, delay: Duration, after: &[&str]) -> Self {
        let def = self.recorder.async_task(name, timeout, delay);
        self.push(def, after)
    }

    /// Add a relay connection to the most recently added task.
    pub fn through(mut self, relay: &str) -> Self {
        if let Some(last) = self.definitions.pop() {
            self.definitions.push(last.through(relay));
        }
        self
    }

    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    pub fn build(self) -> (Registry<TaskDefinition>, Recorder) {
        (self.definitions.into_iter().collect(), self.recorder)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
