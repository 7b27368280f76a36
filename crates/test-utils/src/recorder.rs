use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use taskflow::task::{TaskDefinition, TaskInput};

/// Task bodies that record every run, in start order.
///
/// Each body outputs its own name, followed by `<-` and the outputs of its
/// prerequisites joined with `+` when it has any, so `C` after `A` and `B`
/// (where `B` is after `A`) outputs `C<-A+B<-A`.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    runs: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, name: &str) {
        self.runs.lock().unwrap().push(name.to_string());
    }

    /// Names of the bodies that started, in start order.
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }

    pub fn ran(&self, name: &str) -> bool {
        self.runs.lock().unwrap().iter().any(|n| n == name)
    }

    pub fn sync_task(&self, name: &str) -> TaskDefinition {
        let recorder = self.clone();
        TaskDefinition::sync(name, move |input| {
            recorder.record(&input.name);
            Ok(output_for(input))
        })
    }

    pub fn failing_task(&self, name: &str) -> TaskDefinition {
        let recorder = self.clone();
        TaskDefinition::sync(name, move |input| {
            recorder.record(&input.name);
            Err(anyhow!("{} failed on purpose", input.name))
        })
    }

    /// Async body that sleeps for `delay` before producing its output.
    pub fn async_task(&self, name: &str, timeout: Duration, delay: Duration) -> TaskDefinition {
        let recorder = self.clone();
        TaskDefinition::asynchronous(name, timeout, move |input: TaskInput| {
            let recorder = recorder.clone();
            async move {
                recorder.record(&input.name);
                tokio::time::sleep(delay).await;
                anyhow::Ok(output_for(&input))
            }
        })
    }
}

pub fn output_for(input: &TaskInput) -> String {
    if input.upstream.is_empty() {
        input.name.clone()
    } else {
        let upstream: Vec<&str> = input.upstream.values().map(String::as_str).collect();
        format!("{}<-{}", input.name, upstream.join("+"))
    }
}
