// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod registry;
pub mod task;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{Pipeline, Plan, RunReport};
use crate::task::{ExecutionContext, TaskKind};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the pipeline file, then either prints the plan
/// (`--dry-run`) or runs the selected branches once. Returns whether the
/// run succeeded.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let pipeline = Pipeline::from_config(&cfg).with_targets(args.tasks.iter().cloned());
    let plan = pipeline.plan()?;

    if args.dry_run {
        print_dry_run(&cfg, &pipeline, &plan);
        return Ok(true);
    }

    let context = ExecutionContext::current()?
        .with_vars(cfg.vars.clone())
        .with_vars(args.vars.iter().cloned());
    info!(config = %config_path.display(), branch = %pipeline.branch_label(), "running pipeline");

    let report = pipeline.run(&context).await?;
    print_report(&report);
    Ok(report.succeeded())
}

/// Print the tasks, their wiring and the plan without executing anything.
fn print_dry_run(cfg: &ConfigFile, pipeline: &Pipeline, plan: &Plan) {
    println!("taskflow dry-run");
    println!("  config.sync_task_cost = {:?}", cfg.settings.sync_task_cost);
    println!("  config.default_timeout = {:?}", cfg.settings.default_timeout);
    if !cfg.vars.is_empty() {
        println!("  vars: {:?}", cfg.vars.keys().collect::<Vec<_>>());
    }
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name}");
        println!("      cmd: {}", task.cmd);
        if let TaskKind::Async { timeout } = task.kind {
            println!("      mode: async (timeout {timeout:?})");
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if !task.through.is_empty() {
            println!("      through: {:?}", task.through);
        }
    }
    println!();

    println!("branch: {}", pipeline.branch_label());
    println!("  order: {}", plan.order.join(" -> "));
    println!("  leaves: {}", plan.leaves.join(", "));
    println!("  timeout bound: {:?}", plan.timeout);

    debug!("dry-run complete (no execution)");
}

fn print_report(report: &RunReport) {
    println!("taskflow run: {}", report.branch);
    for (name, state) in report.states.iter() {
        match report.errors.get(name) {
            Some(reason) => println!("  {name}: {state:?} ({reason})"),
            None => println!("  {name}: {state:?}"),
        }
    }
    for err in &report.fire_errors {
        println!("  fire error: {err}");
    }
    if report.timed_out {
        println!("  timed out after {:?}", report.timeout);
    }
}
