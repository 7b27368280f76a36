mod common;

use std::time::Duration;

use common::{TestResult, names, noop};
use taskflow::dag::DependencyGraph;
use taskflow::errors::TaskflowError;
use taskflow::registry::{GraphKind, Registry};
use taskflow::task::{Readiness, TaskDefinition};
use taskflow_test_utils::PipelineBuilder;

fn abc() -> Registry<TaskDefinition> {
    PipelineBuilder::new()
        .sync("A", &[])
        .sync("B", &["A"])
        .sync("C", &["A", "B"])
        .build()
        .0
}

#[test]
fn sorted_dependency_graph_is_prerequisites_first() -> TestResult {
    let registry = abc();
    let order = registry.sorted::<&str>(GraphKind::Dependencies, &[])?;
    assert_eq!(names(order), vec!["A", "B", "C"]);

    // Same input, same output.
    let again = registry.sorted::<&str>(GraphKind::Dependencies, &[])?;
    assert_eq!(names(again), vec!["A", "B", "C"]);
    Ok(())
}

#[test]
fn insertion_order_breaks_ties() -> TestResult {
    let registry: Registry<_> = [noop("z"), noop("m"), noop("a").after("z"), noop("b")]
        .into_iter()
        .collect();
    let order = registry.sorted::<&str>(GraphKind::Dependencies, &[])?;
    assert_eq!(names(order), vec!["z", "m", "a", "b"]);
    Ok(())
}

#[test]
fn mutual_dependency_is_a_cycle() {
    let registry: Registry<_> = [noop("A").after("B"), noop("B").after("A"), noop("C")]
        .into_iter()
        .collect();

    match registry.sorted::<&str>(GraphKind::Dependencies, &[]) {
        Err(TaskflowError::CyclicDependency(members)) => assert_eq!(members, vec!["A", "B"]),
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let registry: Registry<_> = [noop("A").after("A")].into_iter().collect();
    assert!(matches!(
        registry.sorted::<&str>(GraphKind::Dependencies, &[]),
        Err(TaskflowError::CyclicDependency(ref members)) if members == &["A"]
    ));
}

#[test]
fn combined_subtree_keeps_only_the_closure() -> TestResult {
    let mut graph = DependencyGraph::new();
    graph.set("X", ["Y"]);
    graph.set("Y", Vec::<String>::new());
    graph.set("Z", ["Y"]);

    let sub = graph.combined_subtrees(&["X"])?;
    assert_eq!(sub.nodes().collect::<Vec<_>>(), vec!["X", "Y"]);
    let prereqs: Vec<_> = sub.prerequisites_of("X").into_iter().flatten().collect();
    assert_eq!(prereqs, vec!["Y"]);
    Ok(())
}

#[test]
fn branch_sort_is_restricted_to_the_branch() -> TestResult {
    let registry = abc();
    assert_eq!(names(registry.sorted(GraphKind::Dependencies, &["B"])?), vec!["A", "B"]);
    assert_eq!(names(registry.sorted(GraphKind::Dependencies, &["A"])?), vec!["A"]);
    assert!(matches!(
        registry.sorted(GraphKind::Dependencies, &["nope"]),
        Err(TaskflowError::UnknownNode { .. })
    ));
    Ok(())
}

#[test]
fn cumulative_timeout_sums_async_timeouts_and_sync_cost() -> TestResult {
    let (registry, _) = PipelineBuilder::new()
        .asynchronous("A", Duration::from_secs(5), &[])
        .sync("B", &["A"])
        .build();

    assert_eq!(registry.cumulative_timeout("B")?, Duration::from_millis(5_100));
    Ok(())
}

#[test]
fn cumulative_timeout_includes_relays() -> TestResult {
    let (registry, _) = PipelineBuilder::new()
        .asynchronous("audit", Duration::from_secs(1), &[])
        .sync("A", &[])
        .sync("B", &["A"])
        .through("audit")
        .build();

    assert_eq!(registry.cumulative_timeout("B")?, Duration::from_millis(1_200));
    Ok(())
}

#[test]
fn task_state_before_connect() {
    let registry = abc();
    assert_eq!(registry.task_state("A"), Readiness::Unavailable);
    assert_eq!(registry.task_state("C"), Readiness::Unavailable);
    assert_eq!(registry.task_state("Z"), Readiness::Missing);
}

#[test]
fn find_parents_returns_direct_consumers_only() {
    let registry = abc();
    assert_eq!(names(registry.find_parents("A")), vec!["B", "C"]);
    assert_eq!(names(registry.find_parents("B")), vec!["C"]);
    assert!(registry.find_parents("C").is_empty());
    assert!(registry.find_parents("unknown").is_empty());
}

#[test]
fn storage_accessors() -> TestResult {
    let mut registry = abc();
    assert_eq!(registry.len(), 3);
    assert!(registry.contains("B"));
    assert_eq!(names(registry.slice(&["C", "A"])?), vec!["C", "A"]);
    assert_eq!(registry["C"].dependencies().len(), 2);

    let removed = registry.remove("C").map(|def| def.name().to_string());
    assert_eq!(removed.as_deref(), Some("C"));
    assert!(registry.find_parents("B").is_empty());
    assert_eq!(
        registry.iter().map(|(name, _)| name).collect::<Vec<_>>(),
        vec!["A", "B"]
    );
    Ok(())
}
