// src/registry/orchestrate.rs

//! Wiring, firing and rewiring of live task instances.

use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::{Entity, GraphKind, Registry};
use crate::errors::{Result, TaskflowError};
use crate::task::{Connected, FireResult, Siblings, TaskCell, TaskInstance, TaskName, TaskState};

/// Splice request for [`Registry::proxy_dependencies`].
///
/// Every task that depends on `from` gains `instance` as an extra
/// prerequisite; the branch ending in `to` is then re-connected.
#[derive(Debug)]
pub struct Proxy {
    pub from: TaskName,
    pub to: TaskName,
    pub instance: TaskInstance,
}

impl Registry<TaskInstance> {
    /// Connect every instance in the dependency subtrees of `branches` (all
    /// instances when empty), prerequisites first.
    pub fn connect<S: AsRef<str>>(&mut self, branches: &[S]) -> Result<Vec<Connected>> {
        self.connect_along(GraphKind::Dependencies, branches)
    }

    /// Same as [`Registry::connect`] but walks the connection graph, so relay
    /// nodes are connected too.
    pub fn connect_including_betweens<S: AsRef<str>>(
        &mut self,
        branches: &[S],
    ) -> Result<Vec<Connected>> {
        self.connect_along(GraphKind::Connections, branches)
    }

    pub fn connect_along<S: AsRef<str>>(
        &mut self,
        graph: GraphKind,
        branches: &[S],
    ) -> Result<Vec<Connected>> {
        let order = self.sorted_names(graph, branches)?;
        let mut connected = Vec::with_capacity(order.len());

        for name in order {
            self.prepared.insert(name.clone());
            let instance = self
                .storage
                .get(&name)
                .ok_or_else(|| TaskflowError::unknown(name.clone()))?;
            connected.push(instance.connect(self)?);
        }

        info!(?graph, connected = connected.len(), "connected task instances");
        Ok(connected)
    }

    /// Splice `proxy.instance` in front of every consumer of `proxy.from`,
    /// then re-connect the branch ending in `proxy.to`.
    ///
    /// The instance is stored if no task of the same name exists yet. When it
    /// has no execution context it inherits the one of `from`.
    pub fn proxy_dependencies(&mut self, proxy: Proxy) -> Result<Vec<Connected>> {
        let Proxy {
            from,
            to,
            mut instance,
        } = proxy;
        let spliced = instance.name().to_string();

        let from_context = self
            .get(&from)
            .ok_or_else(|| TaskflowError::unknown(from.clone()))?
            .context()
            .cloned();

        let parents: Vec<TaskName> = self
            .find_parents(&from)
            .into_iter()
            .map(|parent| parent.name().to_string())
            .filter(|parent| *parent != spliced)
            .collect();

        // Sort the rewired branch up front; a failed splice leaves storage untouched.
        let mut candidate = self.connection_graph().clone();
        if !candidate.contains(&spliced) {
            candidate.set(spliced.clone(), instance.connections().iter().cloned());
        }
        for parent in &parents {
            candidate.add_edge(parent, spliced.clone());
        }
        candidate
            .combined_subtrees(&[to.as_str()])?
            .topological_sort()?;

        if self.contains(&spliced) {
            debug!(task = %spliced, "spliced task already stored; keeping the stored instance");
        } else {
            let detached = instance.context().is_none();
            if let (true, Some(context)) = (detached, from_context) {
                let siblings = self.siblings_with(&instance);
                instance.attach(siblings, &context);
            }
            self.insert(instance);
            self.refresh_siblings();
        }

        for parent in &parents {
            self.add_dependency(parent, &spliced)?;
        }

        info!(%from, %to, task = %spliced, ?parents, "spliced task into the graph");
        self.connect_including_betweens(&[to])
    }

    /// Fire the leaves of the dependency subtrees of `names` (all leaves when
    /// empty). Asynchronous leaves go first; otherwise topological order is
    /// kept.
    ///
    /// A failing fire does not stop the batch; every leaf gets its own result.
    pub fn fire_from_edges<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<FireResult>> {
        let mut leaves: Vec<&TaskInstance> = self
            .sorted(GraphKind::Dependencies, names)?
            .into_iter()
            .filter(|instance| instance.is_leaf())
            .collect();
        leaves.sort_by_key(|instance| !instance.is_async());

        debug!(
            leaves = ?leaves.iter().map(|i| i.name()).collect::<Vec<_>>(),
            "firing leaf tasks"
        );

        let results = leaves
            .into_iter()
            .map(|instance| {
                let result = instance.fire();
                if let Err(err) = &result {
                    warn!(task = %instance.name(), error = %err, "fire failed; continuing with remaining leaves");
                }
                result
            })
            .collect();
        Ok(results)
    }

    /// Execution state of every instance in the connection subtree of
    /// `branch`.
    pub fn dependency_states(&self, branch: &str) -> Result<IndexMap<TaskName, TaskState>> {
        self.states_of(&[branch])
    }

    /// [`Registry::dependency_states`] over several branches; all instances
    /// when empty.
    pub fn states_of<S: AsRef<str>>(&self, branches: &[S]) -> Result<IndexMap<TaskName, TaskState>> {
        Ok(self
            .sorted(GraphKind::Connections, branches)?
            .into_iter()
            .map(|instance| (instance.name().to_string(), instance.state()))
            .collect())
    }

    /// Future resolving once every instance in the connection subtrees of
    /// `branches` is `Completed` or `Failed`.
    ///
    /// Enforces no deadline; callers bound it themselves, typically with
    /// [`Registry::cumulative_timeout`].
    pub fn wait_for<S: AsRef<str>>(
        &self,
        branches: &[S],
    ) -> Result<impl Future<Output = IndexMap<TaskName, TaskState>> + Send + 'static> {
        let cells: Vec<Arc<TaskCell>> = self
            .sorted(GraphKind::Connections, branches)?
            .into_iter()
            .map(|instance| Arc::clone(instance.cell()))
            .collect();

        Ok(async move {
            let mut states = IndexMap::with_capacity(cells.len());
            for cell in cells {
                let state = cell.wait_terminal().await;
                states.insert(cell.name().to_string(), state);
            }
            states
        })
    }

    /// Hand every attached instance a sibling snapshot of current storage.
    fn refresh_siblings(&mut self) {
        let siblings: Siblings = Arc::new(
            self.storage
                .iter()
                .map(|(name, instance)| (name.clone(), Arc::clone(instance.cell())))
                .collect(),
        );
        for instance in self.storage.values_mut() {
            if instance.context().is_some() {
                instance.set_siblings(Arc::clone(&siblings));
            }
        }
    }

    fn siblings_with(&self, extra: &TaskInstance) -> Siblings {
        let stored = self
            .storage
            .iter()
            .map(|(name, instance)| (name.clone(), Arc::clone(instance.cell())));
        let extra = std::iter::once((extra.name().to_string(), Arc::clone(extra.cell())));
        Arc::new(stored.chain(extra).collect())
    }
}
