// src/dag/subtree.rs

//! Prerequisite-closure walks over name → prerequisites maps.

use std::collections::HashSet;

use indexmap::IndexSet;

use crate::errors::{Result, TaskflowError};
use crate::task::TaskName;

/// Collect every name reachable from `starts` by following prerequisite
/// edges, the starting names included.
///
/// `lookup` returns the prerequisite set of a node, or `None` when the node
/// does not exist. An unknown start name or a dangling edge is an error.
pub fn ancestor_closure<'g, S, F>(starts: &[S], lookup: F) -> Result<HashSet<TaskName>>
where
    S: AsRef<str>,
    F: Fn(&str) -> Option<&'g IndexSet<TaskName>>,
{
    let mut stack: Vec<(TaskName, Option<TaskName>)> = starts
        .iter()
        .map(|s| (s.as_ref().to_string(), None))
        .collect();
    let mut visited: HashSet<TaskName> = HashSet::new();

    while let Some((current, parent)) = stack.pop() {
        if visited.contains(&current) {
            continue;
        }

        let prereqs = match (lookup(&current), parent) {
            (Some(p), _) => p,
            (None, Some(parent)) => return Err(TaskflowError::dangling(current, parent)),
            (None, None) => return Err(TaskflowError::unknown(current)),
        };

        for p in prereqs {
            stack.push((p.clone(), Some(current.clone())));
        }
        visited.insert(current);
    }

    Ok(visited)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn map(edges: &[(&str, &[&str])]) -> HashMap<TaskName, IndexSet<TaskName>> {
        edges
            .iter()
            .map(|(n, p)| (n.to_string(), p.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn closure_includes_start_and_ancestors() {
        let m = map(&[("A", &[]), ("B", &["A"]), ("C", &["B"]), ("D", &[])]);
        let got = ancestor_closure(&["C"], |n| m.get(n)).unwrap();
        let expected: HashSet<TaskName> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn closure_reports_dangling_parent() {
        let m = map(&[("B", &["A"])]);
        match ancestor_closure(&["B"], |n| m.get(n)) {
            Err(TaskflowError::UnknownNode {
                name,
                referenced_by,
            }) => {
                assert_eq!(name, "A");
                assert_eq!(referenced_by.as_deref(), Some("B"));
            }
            other => panic!("expected UnknownNode, got {other:?}"),
        }
    }
}
