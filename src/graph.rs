//! Dependency graph of the targets a run needs.
//!
//! Built from the requested targets by following `depends` names. Edges
//! point from a dependency to its dependent. Ordering is Kahn's
//! algorithm with ties broken by declaration order, so runs are
//! reproducible.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::node::{NodeId, Tree};

/// Target resolution failures. Raised before anything executes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown target '{name}'{}", .referenced_by.as_ref().map(|by| format!(" (required by '{by}')")).unwrap_or_default())]
    UnknownTarget {
        name: String,
        referenced_by: Option<String>,
    },
    #[error("dependency cycle between {}", .members.join(", "))]
    DependencyCycle { members: Vec<String> },
}

pub struct TargetGraph {
    graph: DiGraph<NodeId, ()>,
    nodes: HashMap<NodeId, NodeIndex>,
}

impl TargetGraph {
    /// Collect `requested` and everything they depend on.
    ///
    /// # Errors
    ///
    /// `UnknownTarget` for a dependency name that does not resolve,
    /// `DependencyCycle` if the collected targets are not acyclic.
    pub fn build(tree: &Tree, requested: &[NodeId]) -> Result<Self, ResolveError> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        let mut pending: Vec<NodeId> = Vec::new();

        for &target in requested {
            if !nodes.contains_key(&target) {
                nodes.insert(target, graph.add_node(target));
                pending.push(target);
            }
        }

        while let Some(target) = pending.pop() {
            let Some(def) = tree.target(target) else {
                continue;
            };
            let ns = tree.owning_namespace(target);
            for name in &def.depends {
                let dep = ns
                    .and_then(|ns| tree.find_target(ns, name))
                    .ok_or_else(|| ResolveError::UnknownTarget {
                        name: name.clone(),
                        referenced_by: Some(tree.target_path(target)),
                    })?;
                let dep_idx = *nodes.entry(dep).or_insert_with(|| {
                    pending.push(dep);
                    graph.add_node(dep)
                });
                graph.update_edge(dep_idx, nodes[&target], ());
            }
        }

        let dag = Self { graph, nodes };
        dag.verify_acyclic(tree)?;
        debug!(targets = dag.len(), "dependency graph built");
        Ok(dag)
    }

    fn verify_acyclic(&self, tree: &Tree) -> Result<(), ResolveError> {
        let cycle = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| match scc.as_slice() {
                [single] => self.graph.contains_edge(*single, *single),
                _ => true,
            })
            .map(|scc| {
                let mut members: Vec<NodeId> = scc.into_iter().map(|idx| self.graph[idx]).collect();
                members.sort_unstable();
                members
            })
            .min();
        match cycle {
            Some(members) => Err(ResolveError::DependencyCycle {
                members: members.into_iter().map(|t| tree.target_path(t)).collect(),
            }),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    #[must_use]
    pub fn contains(&self, target: NodeId) -> bool {
        self.nodes.contains_key(&target)
    }

    fn in_degrees(&self) -> HashMap<NodeIndex, usize> {
        self.graph
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    self.graph
                        .neighbors_directed(idx, Direction::Incoming)
                        .count(),
                )
            })
            .collect()
    }

    /// Targets with dependencies first; among ready targets the earlier
    /// declaration runs first.
    #[must_use]
    pub fn order(&self) -> Vec<NodeId> {
        let mut in_degree = self.in_degrees();
        let mut ready: BinaryHeap<Reverse<(NodeId, NodeIndex)>> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&idx, _)| Reverse((self.graph[idx], idx)))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse((target, idx))) = ready.pop() {
            order.push(target);
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(d) = in_degree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(Reverse((self.graph[next], next)));
                    }
                }
            }
        }
        order
    }

    /// Groups of targets whose dependencies all sit in earlier groups.
    #[must_use]
    pub fn waves(&self) -> Vec<Vec<NodeId>> {
        let mut in_degree = self.in_degrees();
        let mut current: BTreeSet<(NodeId, NodeIndex)> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&idx, _)| (self.graph[idx], idx))
            .collect();

        let mut waves = Vec::new();
        while !current.is_empty() {
            let mut next_wave = BTreeSet::new();
            for &(_, idx) in &current {
                for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                    if let Some(d) = in_degree.get_mut(&next) {
                        *d -= 1;
                        if *d == 0 {
                            next_wave.insert((self.graph[next], next));
                        }
                    }
                }
            }
            waves.push(current.into_iter().map(|(target, _)| target).collect());
            current = next_wave;
        }
        waves
    }
}
