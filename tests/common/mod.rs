#![allow(dead_code)]

use taskflow::registry::{Entity, Registry};
use taskflow::task::{ExecutionContext, TaskDefinition, TaskInstance};

pub use taskflow_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Context bound to the test's runtime, with tracing initialised.
pub fn context() -> ExecutionContext {
    init_tracing();
    ExecutionContext::current().expect("tests run inside a tokio runtime")
}

/// Fresh instances of `definitions`, attached to the current runtime.
pub fn instances(definitions: &Registry<TaskDefinition>) -> Registry<TaskInstance> {
    definitions.instances(&context())
}

pub fn names<E: Entity>(entities: Vec<&E>) -> Vec<&str> {
    entities.into_iter().map(|e| e.name()).collect()
}

pub fn noop(name: &str) -> TaskDefinition {
    TaskDefinition::sync(name, |_| Ok(String::new()))
}
