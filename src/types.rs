use std::str::FromStr;
use serde::Deserialize;

/// How a configured task runs.
///
/// - `Sync`: fires inline and blocks the orchestrating flow (default).
/// - `Async`: fires on the runtime and is bounded by a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    #[default]
    Sync,
    Async,
}

impl FromStr for TaskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sync" => Ok(TaskMode::Sync),
            "async" => Ok(TaskMode::Async),
            other => Err(format!(
                "invalid task mode: {other} (expected \"sync\" or \"async\")"
            )),
        }
    }
}
