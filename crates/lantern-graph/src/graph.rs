//! Page dependency graph
//!
//! A [`Graph`] is a flat arena of [`Node`]s plus one designated root. It is
//! read-only once built; optimistic and pessimistic variants are produced by
//! cloning the arena and filtering edge classes, never by mutating the
//! original.

use crate::node::{
    CpuNode, Dependency, DependencyKind, DependencyList, DependentList, NetworkNode, Node, NodeId,
    NodeKind, NodePayload,
};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Which end of the graph a traversal starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Root first; a node is yielded after all of its dependencies
    #[default]
    FromRoot,
    /// Leaves first; a node is yielded after all of its dependents
    FromLeaves,
}

/// Single-rooted, acyclic dependency graph
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Graph {
    /// Assemble a graph from per-node payloads and dependency lists
    ///
    /// Callers guarantee acyclicity and a valid root; dependents are derived
    /// here so both directions are always consistent.
    pub(crate) fn from_parts(
        payloads: Vec<NodePayload>,
        mut dependencies: Vec<DependencyList>,
        root: NodeId,
    ) -> Self {
        debug_assert_eq!(payloads.len(), dependencies.len());

        let mut dependents: Vec<DependentList> = vec![DependentList::new(); payloads.len()];
        for (index, deps) in dependencies.iter_mut().enumerate() {
            deps.sort_by_key(|dep| (dep.node, dep.kind));
            deps.dedup_by_key(|dep| dep.node);
            for dep in deps.iter() {
                dependents[dep.node.index()].push(NodeId::from_index(index));
            }
        }

        let nodes = payloads
            .into_iter()
            .zip(dependencies)
            .zip(dependents)
            .enumerate()
            .map(|(index, ((payload, deps), dependents))| {
                Node::new(NodeId::from_index(index), payload, deps, dependents)
            })
            .collect();

        Self { nodes, root }
    }

    /// The initial document request (or whatever node everything hangs off)
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn root_node(&self) -> &Node {
        &self.nodes[self.root.index()]
    }

    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// All nodes in id order
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.dependencies().len()).sum()
    }

    /// Dependencies of `id`; empty for unknown ids
    #[must_use]
    pub fn dependencies(&self, id: NodeId) -> &[Dependency] {
        self.node(id).map(Node::dependencies).unwrap_or_default()
    }

    /// Dependents of `id`; empty for unknown ids
    #[must_use]
    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(Node::dependents).unwrap_or_default()
    }

    /// Lazy topological walk; call again to restart
    #[must_use]
    pub fn traverse(&self, direction: Direction) -> Traversal<'_> {
        Traversal::new(self, direction)
    }

    pub fn network_nodes(&self) -> impl Iterator<Item = (NodeId, &NetworkNode)> + '_ {
        self.nodes
            .iter()
            .filter_map(|n| n.as_network().map(|network| (n.id(), network)))
    }

    pub fn cpu_nodes(&self) -> impl Iterator<Item = (NodeId, &CpuNode)> + '_ {
        self.nodes
            .iter()
            .filter_map(|n| n.as_cpu().map(|cpu| (n.id(), cpu)))
    }

    #[must_use]
    pub fn count_of(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind() == kind).count()
    }

    /// The root when it is a network request
    #[must_use]
    pub fn main_document(&self) -> Option<&NetworkNode> {
        self.root_node().as_network()
    }

    #[must_use]
    pub fn total_transfer_bytes(&self) -> u64 {
        self.network_nodes().map(|(_, n)| n.transfer_size).sum()
    }

    /// Whether every node is reachable in topological order
    ///
    /// Always true for graphs produced by the builders; used as a cheap
    /// precondition check by consumers that must refuse cyclic input.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        self.traverse(Direction::FromRoot).count() == self.nodes.len()
    }

    /// Optimistic variant: drops "CPU task blocks dependent render" edges
    #[must_use]
    pub fn clone_with_relaxed_dependencies(&self) -> Graph {
        self.clone_retaining_dependencies(|_, dep| !dep.kind.is_relaxable())
    }

    /// Pessimistic variant: every edge is kept
    #[must_use]
    pub fn clone_with_strict_dependencies(&self) -> Graph {
        self.clone_retaining_dependencies(|_, _| true)
    }

    /// Clone keeping only the edges `keep` accepts
    ///
    /// Nodes left without dependencies are re-attached to the root through a
    /// [`DependencyKind::Synthetic`] edge so the variant stays single-rooted.
    #[must_use]
    pub fn clone_retaining_dependencies<F>(&self, keep: F) -> Graph
    where
        F: Fn(&Node, &Dependency) -> bool,
    {
        let mut payloads = Vec::with_capacity(self.nodes.len());
        let mut dependencies = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let mut deps: DependencyList = node
                .dependencies()
                .iter()
                .filter(|dep| keep(node, dep))
                .copied()
                .collect();
            if deps.is_empty() && node.id() != self.root {
                deps.push(Dependency::new(self.root, DependencyKind::Synthetic));
            }
            payloads.push(node.payload().clone());
            dependencies.push(deps);
        }

        Graph::from_parts(payloads, dependencies, self.root)
    }
}

/// Stable topological iterator over a [`Graph`]
///
/// Kahn's algorithm with a min-heap on ids, so ties are always broken by
/// insertion order and two traversals of the same graph are identical.
#[derive(Debug, Clone)]
pub struct Traversal<'g> {
    graph: &'g Graph,
    direction: Direction,
    pending: Vec<usize>,
    ready: BinaryHeap<Reverse<NodeId>>,
}

impl<'g> Traversal<'g> {
    fn new(graph: &'g Graph, direction: Direction) -> Self {
        let pending: Vec<usize> = graph
            .nodes
            .iter()
            .map(|n| match direction {
                Direction::FromRoot => n.dependencies().len(),
                Direction::FromLeaves => n.dependents().len(),
            })
            .collect();
        let ready = pending
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0)
            .map(|(index, _)| Reverse(NodeId::from_index(index)))
            .collect();

        Self {
            graph,
            direction,
            pending,
            ready,
        }
    }
}

impl<'g> Iterator for Traversal<'g> {
    type Item = &'g Node;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(id) = self.ready.pop()?;
        let graph = self.graph;
        let node = &graph.nodes[id.index()];

        let mut release = |next: NodeId| {
            let count = &mut self.pending[next.index()];
            *count -= 1;
            if *count == 0 {
                self.ready.push(Reverse(next));
            }
        };
        match self.direction {
            Direction::FromRoot => node.dependents().iter().copied().for_each(&mut release),
            Direction::FromLeaves => node
                .dependencies()
                .iter()
                .map(|dep| dep.node)
                .for_each(&mut release),
        }

        Some(node)
    }
}
