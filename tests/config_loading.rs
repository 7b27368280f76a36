mod common;

use std::io::Write;
use std::time::Duration;

use common::TestResult;
use taskflow::cli::CliArgs;
use taskflow::config::{ConfigFile, load_and_validate, load_from_path};
use taskflow::errors::TaskflowError;
use taskflow::registry::{Entity, GraphKind};
use taskflow::task::TaskKind;
use taskflow_test_utils::{ConfigFileBuilder, TaskConfigBuilder};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

const PIPELINE: &str = r#"
[config]
sync_task_cost = "250ms"

[vars]
GREETING = "hello"

[task.zeta]
cmd = "echo zeta"

[task.fetch]
cmd = "echo fetched"
mode = "async"
timeout = "2s"

[task.audit]
cmd = "echo audit"

[task.parse]
cmd = "echo parsed"
after = ["fetch", "zeta"]
through = ["audit"]
"#;

#[test]
fn loads_tasks_in_file_order() -> TestResult {
    let file = write_config(PIPELINE);
    let cfg = load_and_validate(file.path())?;

    assert_eq!(
        cfg.task.keys().collect::<Vec<_>>(),
        vec!["zeta", "fetch", "audit", "parse"]
    );
    assert_eq!(cfg.settings.sync_task_cost, Duration::from_millis(250));
    assert_eq!(cfg.vars["GREETING"], "hello");
    assert_eq!(
        cfg.task["fetch"].kind,
        TaskKind::Async {
            timeout: Duration::from_secs(2)
        }
    );
    Ok(())
}

#[test]
fn definitions_carry_dependencies_relays_and_costs() -> TestResult {
    let file = write_config(PIPELINE);
    let definitions = load_and_validate(file.path())?.definitions();

    let parse = &definitions["parse"];
    assert_eq!(parse.dependencies().iter().collect::<Vec<_>>(), vec!["fetch", "zeta"]);
    assert_eq!(
        parse.connections().iter().collect::<Vec<_>>(),
        vec!["fetch", "zeta", "audit"]
    );
    assert!(definitions["fetch"].is_async());

    let order = definitions.sorted_names(GraphKind::Connections, &["parse"])?;
    assert_eq!(order, vec!["zeta", "fetch", "audit", "parse"]);

    // 2s + 3 * 250ms
    assert_eq!(definitions.cumulative_timeout("parse")?, Duration::from_millis(2_750));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_from_path("/definitely/not/here/Taskflow.toml").unwrap_err();
    assert!(matches!(err, TaskflowError::IoError(_)));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = write_config("[task.a\ncmd = ");
    assert!(matches!(load_from_path(file.path()), Err(TaskflowError::TomlError(_))));
}

#[test]
fn unknown_mode_is_rejected_while_parsing() {
    let file = write_config("[task.a]\ncmd = \"true\"\nmode = \"sometimes\"\n");
    assert!(matches!(load_from_path(file.path()), Err(TaskflowError::TomlError(_))));
}

fn config_error(raw: taskflow::config::RawConfigFile) -> String {
    match ConfigFile::try_from(raw) {
        Err(TaskflowError::ConfigError(msg)) => msg,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn empty_config_is_rejected() {
    let msg = config_error(ConfigFileBuilder::new().raw());
    assert!(msg.contains("at least one"));
}

#[test]
fn unknown_dependency_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new("true").after("ghost").build())
        .raw();
    assert!(config_error(raw).contains("unknown dependency 'ghost'"));
}

#[test]
fn unknown_relay_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new("true").through("ghost").build())
        .raw();
    assert!(config_error(raw).contains("`through`"));
}

#[test]
fn self_dependency_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new("true").after("a").build())
        .raw();
    assert!(config_error(raw).contains("cannot reference itself"));
}

#[test]
fn cycle_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new("true").after("b").build())
        .with_task("b", TaskConfigBuilder::new("true").after("a").build())
        .raw();
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(TaskflowError::CyclicDependency(_))
    ));
}

#[test]
fn bad_durations_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_sync_task_cost("fast")
        .with_task("a", TaskConfigBuilder::new("true").build())
        .raw();
    assert!(config_error(raw).contains("sync_task_cost"));

    let raw = ConfigFileBuilder::new()
        .with_task(
            "a",
            TaskConfigBuilder::new("true").asynchronous().timeout("5 days").build(),
        )
        .raw();
    assert!(config_error(raw).contains("timeout"));
}

#[test]
fn invalid_task_name_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("-leading-dash", TaskConfigBuilder::new("true").build())
        .raw();
    assert!(config_error(raw).contains("invalid task name"));
}

#[tokio::test]
async fn dry_run_validates_without_executing() -> TestResult {
    let file = write_config(PIPELINE);
    let args = CliArgs {
        config: file.path().display().to_string(),
        tasks: vec!["parse".into()],
        vars: Vec::new(),
        log_level: None,
        dry_run: true,
    };
    assert!(taskflow::run(args).await?);
    Ok(())
}
