// src/registry/mod.rs

//! The task registry: storage, cached graphs and read-only queries.
//!
//! [`Registry`] is generic over an [`Entity`] so the same ordering and query
//! machinery serves both the definitions registry and the instances registry
//! produced by [`Registry::instances`]. Operations that wire and fire live
//! instances are in [`orchestrate`].
//!
//! Both graphs are memoised on first use. Every mutating accessor drops the
//! caches, so a sort after a mutation always sees current storage.

pub mod orchestrate;

use std::cell::OnceCell;
use std::ops::Index;
use std::sync::Arc;
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::dag::DependencyGraph;
use crate::errors::{Result, TaskflowError};
use crate::task::{
    ExecutionContext, Readiness, Siblings, TaskDefinition, TaskInstance, TaskKind, TaskName,
};

pub use orchestrate::Proxy;

/// Cost charged for a synchronous task by [`Registry::cumulative_timeout`].
pub const DEFAULT_SYNC_TASK_COST: Duration = Duration::from_millis(100);

/// Anything that can be stored in a [`Registry`].
pub trait Entity {
    fn name(&self) -> &str;

    /// Hard prerequisites.
    fn dependencies(&self) -> &IndexSet<TaskName>;

    /// Prerequisites plus relay nodes.
    fn connections(&self) -> &IndexSet<TaskName>;

    fn kind(&self) -> TaskKind;

    /// Add a hard prerequisite; returns false if it was already present.
    fn add_dependency(&mut self, dependency: &str) -> bool;

    fn is_leaf(&self) -> bool {
        self.dependencies().is_empty()
    }

    fn is_async(&self) -> bool {
        self.kind().is_async()
    }
}

impl Entity for TaskDefinition {
    fn name(&self) -> &str {
        TaskDefinition::name(self)
    }

    fn dependencies(&self) -> &IndexSet<TaskName> {
        TaskDefinition::dependencies(self)
    }

    fn connections(&self) -> &IndexSet<TaskName> {
        TaskDefinition::connections(self)
    }

    fn kind(&self) -> TaskKind {
        TaskDefinition::kind(self)
    }

    fn add_dependency(&mut self, dependency: &str) -> bool {
        TaskDefinition::add_dependency(self, dependency)
    }
}

impl Entity for TaskInstance {
    fn name(&self) -> &str {
        TaskInstance::name(self)
    }

    fn dependencies(&self) -> &IndexSet<TaskName> {
        TaskInstance::dependencies(self)
    }

    fn connections(&self) -> &IndexSet<TaskName> {
        TaskInstance::connections(self)
    }

    fn kind(&self) -> TaskKind {
        TaskInstance::kind(self)
    }

    fn add_dependency(&mut self, dependency: &str) -> bool {
        TaskInstance::add_dependency(self, dependency)
    }
}

/// Which of the two graphs an operation walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    /// Edges are hard prerequisites.
    Dependencies,
    /// Edges are prerequisites plus relay nodes.
    Connections,
}

#[derive(Debug)]
pub struct Registry<E> {
    storage: IndexMap<TaskName, E>,
    dependency_graph: OnceCell<DependencyGraph>,
    connection_graph: OnceCell<DependencyGraph>,
    prepared: IndexSet<TaskName>,
    sync_task_cost: Duration,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            storage: IndexMap::new(),
            dependency_graph: OnceCell::new(),
            connection_graph: OnceCell::new(),
            prepared: IndexSet::new(),
            sync_task_cost: DEFAULT_SYNC_TASK_COST,
        }
    }
}

impl<E: Entity> Registry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the cost charged for synchronous tasks in timeout sums.
    pub fn with_sync_task_cost(mut self, cost: Duration) -> Self {
        self.sync_task_cost = cost;
        self
    }

    pub fn sync_task_cost(&self) -> Duration {
        self.sync_task_cost
    }

    /// Store `entity` under its own name, returning the entity it replaced.
    pub fn insert(&mut self, entity: E) -> Option<E> {
        self.invalidate_graphs();
        self.storage.insert(entity.name().to_string(), entity)
    }

    pub fn get(&self, name: &str) -> Option<&E> {
        self.storage.get(name)
    }

    /// Mutable access to a stored entity. Drops the cached graphs.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut E> {
        self.invalidate_graphs();
        self.storage.get_mut(name)
    }

    /// Remove an entity, keeping the order of the remaining ones.
    ///
    /// The prepared set is never shrunk, so a removed name that was connected
    /// still reports `Readiness::Ready`.
    pub fn remove(&mut self, name: &str) -> Option<E> {
        self.invalidate_graphs();
        self.storage.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.storage.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.storage.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &E)> {
        self.storage.iter().map(|(name, entity)| (name.as_str(), entity))
    }

    /// Entities for `names`, in the order given.
    pub fn slice<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&E>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.storage.get(name).ok_or_else(|| TaskflowError::unknown(name))
            })
            .collect()
    }

    /// Graph of hard prerequisites, built on first use.
    pub fn dependency_graph(&self) -> &DependencyGraph {
        self.dependency_graph
            .get_or_init(|| self.build_graph(|entity| entity.dependencies()))
    }

    /// Graph of prerequisites plus relay nodes, built on first use.
    pub fn connection_graph(&self) -> &DependencyGraph {
        self.connection_graph
            .get_or_init(|| self.build_graph(|entity| entity.connections()))
    }

    pub fn graph(&self, kind: GraphKind) -> &DependencyGraph {
        match kind {
            GraphKind::Dependencies => self.dependency_graph(),
            GraphKind::Connections => self.connection_graph(),
        }
    }

    /// Drop both cached graphs.
    pub fn invalidate_graphs(&mut self) {
        self.dependency_graph.take();
        self.connection_graph.take();
    }

    fn build_graph<'a, F>(&'a self, edges: F) -> DependencyGraph
    where
        F: Fn(&'a E) -> &'a IndexSet<TaskName>,
    {
        let mut graph = DependencyGraph::new();
        for (name, entity) in &self.storage {
            graph.set(name.clone(), edges(entity).iter().cloned());
        }
        debug!(nodes = graph.len(), "built task graph");
        graph
    }

    /// Topological order of `graph`, restricted to the combined subtrees of
    /// `branches` when any are given.
    pub fn sorted_names<S: AsRef<str>>(
        &self,
        graph: GraphKind,
        branches: &[S],
    ) -> Result<Vec<TaskName>> {
        let graph = self.graph(graph);
        if branches.is_empty() {
            graph.topological_sort()
        } else {
            graph.combined_subtrees(branches)?.topological_sort()
        }
    }

    /// Like [`Registry::sorted_names`], mapped back to stored entities.
    pub fn sorted<S: AsRef<str>>(&self, graph: GraphKind, branches: &[S]) -> Result<Vec<&E>> {
        self.sorted_names(graph, branches)?
            .into_iter()
            .map(|name| {
                self.storage
                    .get(&name)
                    .ok_or_else(|| TaskflowError::unknown(name))
            })
            .collect()
    }

    /// Names that went through the connect protocol, in first-connect order.
    pub fn prepared_futures(&self) -> &IndexSet<TaskName> {
        &self.prepared
    }

    pub fn task_state(&self, name: &str) -> Readiness {
        if self.prepared.contains(name) {
            Readiness::Ready
        } else if self.storage.contains_key(name) {
            Readiness::Unavailable
        } else {
            Readiness::Missing
        }
    }

    /// Stored entities that list `name` as a direct prerequisite.
    pub fn find_parents(&self, name: &str) -> Vec<&E> {
        self.dependency_graph()
            .dependents_of(name)
            .into_iter()
            .filter_map(|parent| self.storage.get(parent))
            .collect()
    }

    /// Add `dependency` to the stored entity `parent`.
    pub fn add_dependency(&mut self, parent: &str, dependency: &str) -> Result<bool> {
        let entity = self
            .get_mut(parent)
            .ok_or_else(|| TaskflowError::unknown(parent))?;
        Ok(entity.add_dependency(dependency))
    }

    /// Worst-case wait bound for `branch`: over its connection-graph subtree,
    /// the sum of every async timeout plus the sync cost for every sync task.
    pub fn cumulative_timeout(&self, branch: &str) -> Result<Duration> {
        self.cumulative_timeout_of(&[branch])
    }

    /// [`Registry::cumulative_timeout`] over the union of several branches.
    /// An empty slice covers the whole registry.
    pub fn cumulative_timeout_of<S: AsRef<str>>(&self, branches: &[S]) -> Result<Duration> {
        let total = self
            .sorted(GraphKind::Connections, branches)?
            .into_iter()
            .map(|entity| entity.kind().timeout().unwrap_or(self.sync_task_cost))
            .sum();
        Ok(total)
    }
}

impl Registry<TaskDefinition> {
    /// One fresh instance per definition, each attached to `context` and to
    /// the handles of all its siblings. `self` is left untouched.
    pub fn instances(&self, context: &ExecutionContext) -> Registry<TaskInstance> {
        let mut storage: IndexMap<TaskName, TaskInstance> = self
            .storage
            .iter()
            .map(|(name, definition)| (name.clone(), definition.instantiate()))
            .collect();

        let siblings: Siblings = Arc::new(
            storage
                .iter()
                .map(|(name, instance)| (name.clone(), Arc::clone(instance.cell())))
                .collect(),
        );

        for instance in storage.values_mut() {
            instance.attach(Arc::clone(&siblings), context);
        }

        debug!(instances = storage.len(), "instantiated task registry");

        Registry {
            storage,
            sync_task_cost: self.sync_task_cost,
            ..Registry::default()
        }
    }
}

impl<E: Entity> Index<&str> for Registry<E> {
    type Output = E;

    /// Panics if `name` is not stored; use [`Registry::get`] otherwise.
    fn index(&self, name: &str) -> &E {
        &self.storage[name]
    }
}

impl<E: Entity> FromIterator<E> for Registry<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let storage = iter
            .into_iter()
            .map(|entity| (entity.name().to_string(), entity))
            .collect();
        Self {
            storage,
            ..Self::default()
        }
    }
}

impl<E: Entity> Extend<E> for Registry<E> {
    fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
        self.invalidate_graphs();
        self.storage
            .extend(iter.into_iter().map(|entity| (entity.name().to_string(), entity)));
    }
}
