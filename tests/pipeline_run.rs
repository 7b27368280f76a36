#![cfg(unix)]

mod common;

use common::{TestResult, context};
use taskflow::engine::Pipeline;
use taskflow::task::TaskState;
use taskflow_test_utils::{ConfigFileBuilder, TaskConfigBuilder};

#[tokio::test]
async fn shell_pipeline_passes_vars_and_upstream_output() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_sync_task_cost("2s")
        .with_var("GREETING", "hello")
        .with_task("greet", TaskConfigBuilder::new("echo $GREETING").build())
        .with_task(
            "name",
            TaskConfigBuilder::new("echo world").asynchronous().timeout("5s").build(),
        )
        .with_task(
            "shout",
            TaskConfigBuilder::new("echo \"$TASKFLOW_UPSTREAM_GREET $TASKFLOW_UPSTREAM_NAME!\"")
                .after("greet")
                .after("name")
                .build(),
        )
        .build();

    let ctx = context().with_vars(cfg.vars.clone());
    let report = Pipeline::from_config(&cfg).run(&ctx).await?;

    assert!(report.succeeded(), "{report:?}");
    assert_eq!(report.outputs["shout"], "hello world!");
    Ok(())
}

#[tokio::test]
async fn failing_command_fails_its_branch() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_sync_task_cost("2s")
        .with_task("ok", TaskConfigBuilder::new("true").build())
        .with_task("broken", TaskConfigBuilder::new("exit 3").build())
        .with_task(
            "after_broken",
            TaskConfigBuilder::new("echo unreachable").after("broken").build(),
        )
        .build();

    let report = Pipeline::from_config(&cfg).run(&context()).await?;

    assert!(!report.succeeded());
    assert!(!report.timed_out);
    assert_eq!(report.states["ok"], TaskState::Completed);
    assert_eq!(report.failed_tasks(), vec!["broken", "after_broken"]);
    assert!(report.errors["broken"].contains("status 3"));
    assert!(report.into_result().is_err());
    Ok(())
}

#[tokio::test]
async fn async_command_timeout_fails_the_task() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_sync_task_cost("2s")
        .with_task(
            "sleepy",
            TaskConfigBuilder::new("sleep 5").asynchronous().timeout("100ms").build(),
        )
        .with_task("next", TaskConfigBuilder::new("true").after("sleepy").build())
        .build();

    let report = Pipeline::from_config(&cfg).run(&context()).await?;

    assert!(!report.timed_out);
    assert_eq!(report.states["sleepy"], TaskState::Failed);
    assert_eq!(report.states["next"], TaskState::Failed);
    assert!(report.errors["sleepy"].contains("timed out"));
    Ok(())
}

#[tokio::test]
async fn target_selection_skips_unrelated_tasks() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_sync_task_cost("2s")
        .with_task("a", TaskConfigBuilder::new("echo a").build())
        .with_task("b", TaskConfigBuilder::new("echo b").after("a").build())
        .with_task("other", TaskConfigBuilder::new("exit 1").build())
        .build();

    let pipeline = Pipeline::from_config(&cfg).with_targets(["b"]);
    let report = pipeline.run(&context()).await?;

    assert!(report.succeeded(), "{report:?}");
    assert_eq!(report.states.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    Ok(())
}
