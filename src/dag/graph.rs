// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use indexmap::{IndexMap, IndexSet};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::subtree::ancestor_closure;
use crate::errors::{Result, TaskflowError};
use crate::task::TaskName;

/// In-memory DAG keyed by task name.
///
/// Each node maps to the set of its *direct prerequisites*. Node insertion
/// order is preserved and used as the tie-break when sorting, so the same
/// sequence of `set` calls always yields the same execution order.
///
/// Nothing is validated on insertion; dangling edges and cycles are reported
/// by [`DependencyGraph::topological_sort`] and
/// [`DependencyGraph::combined_subtrees`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: IndexMap<TaskName, IndexSet<TaskName>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the prerequisite set of `name`.
    ///
    /// Overwriting keeps the node's original position.
    pub fn set<I, S>(&mut self, name: impl Into<TaskName>, prerequisites: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        let prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self.nodes.insert(name.into(), prerequisites);
    }

    /// Append a single prerequisite to `name`, creating the node if needed.
    pub fn add_edge(&mut self, name: &str, prerequisite: impl Into<TaskName>) {
        self.nodes
            .entry(name.to_string())
            .or_default()
            .insert(prerequisite.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node names, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Iterate `(name, prerequisites)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&TaskName, &IndexSet<TaskName>)> {
        self.nodes.iter()
    }

    /// Direct prerequisites of `name`, or `None` if the node is unknown.
    pub fn prerequisites_of(&self, name: &str) -> Option<&IndexSet<TaskName>> {
        self.nodes.get(name)
    }

    /// Nodes that list `name` as a direct prerequisite.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, prereqs)| prereqs.contains(name))
            .map(|(node, _)| node.as_str())
            .collect()
    }

    /// Nodes with no prerequisites.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, prereqs)| prereqs.is_empty())
            .map(|(node, _)| node.as_str())
    }

    /// Order all nodes so that each one comes after its prerequisites.
    ///
    /// Uses Kahn's algorithm; whenever several nodes are available, the one
    /// inserted first is emitted first.
    ///
    /// Fails with [`TaskflowError::UnknownNode`] if an edge points outside the
    /// graph and with [`TaskflowError::CyclicDependency`] if no order exists.
    pub fn topological_sort(&self) -> Result<Vec<TaskName>> {
        self.ensure_closed()?;

        let mut in_degree: Vec<usize> = self.nodes.values().map(IndexSet::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        for (idx, prereqs) in self.nodes.values().enumerate() {
            for prereq in prereqs {
                // `ensure_closed` guarantees the lookup succeeds.
                if let Some(p) = self.nodes.get_index_of(prereq) {
                    dependents[p].push(idx);
                }
            }
        }

        let mut available: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(Reverse(idx)) = available.pop() {
            order.push(idx);
            for &dependent in &dependents[idx] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    available.push(Reverse(dependent));
                }
            }
        }

        if order.len() < self.nodes.len() {
            return Err(TaskflowError::CyclicDependency(self.cycle_members()));
        }

        let sorted: Vec<TaskName> = order
            .into_iter()
            .filter_map(|idx| self.nodes.get_index(idx).map(|(name, _)| name.clone()))
            .collect();

        debug!(?sorted, "topological order computed");
        Ok(sorted)
    }

    /// Restrict the graph to the union of the prerequisite closures of
    /// `names` (each name included). Edges among retained nodes are kept and
    /// so is their relative insertion order.
    pub fn combined_subtrees<S: AsRef<str>>(&self, names: &[S]) -> Result<DependencyGraph> {
        let keep = ancestor_closure(names, |name| self.nodes.get(name))?;

        let nodes = self
            .nodes
            .iter()
            .filter(|(name, _)| keep.contains(name.as_str()))
            .map(|(name, prereqs)| (name.clone(), prereqs.clone()))
            .collect();

        Ok(DependencyGraph { nodes })
    }

    fn ensure_closed(&self) -> Result<()> {
        for (name, prereqs) in &self.nodes {
            if let Some(missing) = prereqs.iter().find(|p| !self.nodes.contains_key(*p)) {
                return Err(TaskflowError::dangling(missing.clone(), name.clone()));
            }
        }
        Ok(())
    }

    /// Names involved in a cycle, in insertion order.
    ///
    /// Only called once Kahn's algorithm has failed, so at least one strongly
    /// connected component has more than one node or a self-loop.
    fn cycle_members(&self) -> Vec<TaskName> {
        // Edge direction: prerequisite -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, prereqs) in &self.nodes {
            for prereq in prereqs {
                graph.add_edge(prereq.as_str(), name.as_str(), ());
            }
        }

        let mut members: IndexSet<&str> = IndexSet::new();
        for component in tarjan_scc(&graph) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .is_some_and(|node| graph.contains_edge(*node, *node));
            if cyclic {
                members.extend(component);
            }
        }

        self.nodes
            .keys()
            .filter(|name| members.contains(name.as_str()))
            .cloned()
            .collect()
    }
}

impl<S: Into<TaskName>> FromIterator<(S, Vec<S>)> for DependencyGraph {
    fn from_iter<T: IntoIterator<Item = (S, Vec<S>)>>(iter: T) -> Self {
        let mut graph = DependencyGraph::new();
        for (name, prereqs) in iter {
            graph.set(name, prereqs);
        }
        graph
    }
}
