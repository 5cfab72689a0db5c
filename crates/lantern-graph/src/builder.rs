//! Graph Builder
//!
//! The construction phase for a [`Graph`]. Nodes and edges are collected
//! here, then [`GraphBuilder::build`] validates the structure and produces an
//! immutable graph. Once built, no edge can be added.

use crate::error::GraphConstructionError;
use crate::graph::Graph;
use crate::node::{
    CpuNode, Dependency, DependencyKind, DependencyList, NetworkNode, NodeId, NodePayload,
};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::VecDeque;

/// Builder for constructing validated graphs
///
/// Usage:
/// ```rust,ignore
/// let mut builder = GraphBuilder::new();
/// let document = builder.add_network_node(NetworkNode::new("https://a.test/", 14_000));
/// let script = builder.add_node_with_dependencies(
///     NetworkNode::new("https://a.test/app.js", 80_000),
///     &[Dependency::new(document, DependencyKind::Initiator)],
/// )?;
/// let graph = builder.build()?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct GraphBuilder {
    payloads: Vec<NodePayload>,
    dependencies: Vec<DependencyList>,
}

impl GraphBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty builder sized for `capacity` nodes
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            payloads: Vec::with_capacity(capacity),
            dependencies: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.payloads.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.dependencies.iter().map(|deps| deps.len()).sum()
    }

    /// Add a node with no dependencies yet
    ///
    /// Returns the node ID for use in edge construction.
    pub fn add_node(&mut self, payload: impl Into<NodePayload>) -> NodeId {
        let id = NodeId::from_index(self.payloads.len());
        self.payloads.push(payload.into());
        self.dependencies.push(DependencyList::new());
        id
    }

    pub fn add_network_node(&mut self, node: NetworkNode) -> NodeId {
        self.add_node(node)
    }

    pub fn add_cpu_node(&mut self, node: CpuNode) -> NodeId {
        self.add_node(node)
    }

    /// Add a node together with its full dependency list
    ///
    /// Every dependency must already exist, so nodes added only through this
    /// method can never form a cycle.
    pub fn add_node_with_dependencies(
        &mut self,
        payload: impl Into<NodePayload>,
        dependencies: &[Dependency],
    ) -> Result<NodeId, GraphConstructionError> {
        let next = NodeId::from_index(self.payloads.len());
        if let Some(dep) = dependencies.iter().find(|dep| dep.node >= next) {
            return Err(GraphConstructionError::UnknownNode(dep.node));
        }

        let id = self.add_node(payload);
        self.dependencies[id.index()].extend(dependencies.iter().copied());
        Ok(id)
    }

    /// Record that `dependent` may not start before `dependency` completes
    ///
    /// Adding the same edge twice is a no-op; cycles are reported by
    /// [`GraphBuilder::build`].
    pub fn add_dependency(
        &mut self,
        dependent: NodeId,
        dependency: NodeId,
        kind: DependencyKind,
    ) -> Result<(), GraphConstructionError> {
        for id in [dependent, dependency] {
            if id.index() >= self.payloads.len() {
                return Err(GraphConstructionError::UnknownNode(id));
            }
        }
        if dependent == dependency {
            return Err(GraphConstructionError::SelfLoop(dependent));
        }

        let deps = &mut self.dependencies[dependent.index()];
        if !deps.iter().any(|dep| dep.node == dependency) {
            deps.push(Dependency::new(dependency, kind));
        }
        Ok(())
    }

    /// Check if adding an edge would create a cycle
    ///
    /// This is a preview method that doesn't modify the builder.
    #[must_use]
    pub fn would_create_cycle(&self, dependent: NodeId, dependency: NodeId) -> bool {
        if dependent == dependency {
            return true;
        }
        // A cycle appears iff `dependent` already (transitively) gates `dependency`
        let mut visited = vec![false; self.payloads.len()];
        let mut stack = vec![dependency];
        while let Some(id) = stack.pop() {
            if id == dependent {
                return true;
            }
            if std::mem::replace(&mut visited[id.index()], true) {
                continue;
            }
            stack.extend(self.dependencies[id.index()].iter().map(|dep| dep.node));
        }
        false
    }

    /// Validate the structure and produce an immutable graph
    ///
    /// - rejects empty input and dependency cycles
    /// - picks the root: a node without dependencies that reaches the most
    ///   nodes, lowest id on ties
    /// - attaches every other dependency-free node to the root with a
    ///   [`DependencyKind::Synthetic`] edge, so the result is single-rooted
    pub fn build(mut self) -> Result<Graph, GraphConstructionError> {
        if self.payloads.is_empty() {
            return Err(GraphConstructionError::Empty);
        }
        self.check_acyclic()?;

        let dependents = self.dependents();
        let sources: Vec<NodeId> = (0..self.payloads.len())
            .filter(|&index| self.dependencies[index].is_empty())
            .map(NodeId::from_index)
            .collect();

        let mut root = sources[0];
        let mut best = 0;
        for &source in &sources {
            let reach = reachable_count(&dependents, source);
            if reach > best {
                best = reach;
                root = source;
            }
        }

        let orphans: Vec<NodeId> = sources.into_iter().filter(|&s| s != root).collect();
        if !orphans.is_empty() {
            tracing::warn!(
                "Attaching {} disconnected component(s) to root {}",
                orphans.len(),
                root
            );
            for orphan in orphans {
                self.dependencies[orphan.index()]
                    .push(Dependency::new(root, DependencyKind::Synthetic));
            }
        }

        tracing::debug!(
            "Built graph: {} nodes, {} edges, root {}",
            self.node_count(),
            self.edge_count(),
            root
        );
        Ok(Graph::from_parts(self.payloads, self.dependencies, root))
    }

    fn dependents(&self) -> Vec<Vec<NodeId>> {
        let mut dependents = vec![Vec::new(); self.payloads.len()];
        for (index, deps) in self.dependencies.iter().enumerate() {
            for dep in deps {
                dependents[dep.node.index()].push(NodeId::from_index(index));
            }
        }
        dependents
    }

    fn check_acyclic(&self) -> Result<(), GraphConstructionError> {
        let mut graph: DiGraph<(), ()> =
            DiGraph::with_capacity(self.payloads.len(), self.edge_count());
        for _ in &self.payloads {
            graph.add_node(());
        }
        for (index, deps) in self.dependencies.iter().enumerate() {
            for dep in deps {
                graph.add_edge(NodeIndex::new(dep.node.index()), NodeIndex::new(index), ());
            }
        }

        toposort(&graph, None).map(|_| ()).map_err(|cycle| {
            GraphConstructionError::Cycle {
                node: NodeId::from_index(cycle.node_id().index()),
            }
        })
    }
}

fn reachable_count(dependents: &[Vec<NodeId>], from: NodeId) -> usize {
    let mut seen = vec![false; dependents.len()];
    let mut queue = VecDeque::from([from]);
    seen[from.index()] = true;
    let mut count = 0;
    while let Some(id) = queue.pop_front() {
        count += 1;
        for &next in &dependents[id.index()] {
            if !std::mem::replace(&mut seen[next.index()], true) {
                queue.push_back(next);
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(path: &str) -> NetworkNode {
        NetworkNode::new(format!("https://a.test{path}"), 1000)
    }

    #[test]
    fn test_builder_creates_nodes() {
        let mut builder = GraphBuilder::new();

        let n1 = builder.add_network_node(net("/"));
        let n2 = builder.add_cpu_node(CpuNode::new(10.0));

        assert_eq!(builder.node_count(), 2);
        assert_ne!(n1, n2);
        assert_eq!(n1, NodeId(0));
        assert_eq!(n2, NodeId(1));
    }

    #[test]
    fn test_add_dependency_valid() {
        let mut builder = GraphBuilder::new();

        let n1 = builder.add_network_node(net("/"));
        let n2 = builder.add_network_node(net("/a.js"));

        assert!(builder.add_dependency(n2, n1, DependencyKind::Initiator).is_ok());
        assert_eq!(builder.edge_count(), 1);

        // Duplicate edges are ignored
        assert!(builder.add_dependency(n2, n1, DependencyKind::Explicit).is_ok());
        assert_eq!(builder.edge_count(), 1);
    }

    #[test]
    fn test_add_dependency_rejects_self_loop() {
        let mut builder = GraphBuilder::new();

        let n1 = builder.add_network_node(net("/"));

        assert_eq!(
            builder.add_dependency(n1, n1, DependencyKind::Explicit),
            Err(GraphConstructionError::SelfLoop(n1))
        );
    }

    #[test]
    fn test_add_dependency_rejects_unknown_node() {
        let mut builder = GraphBuilder::new();

        let n1 = builder.add_network_node(net("/"));
        let missing = NodeId(7);

        assert_eq!(
            builder.add_dependency(n1, missing, DependencyKind::Explicit),
            Err(GraphConstructionError::UnknownNode(missing))
        );
    }

    #[test]
    fn test_add_node_with_dependencies_requires_existing_nodes() {
        let mut builder = GraphBuilder::new();
        let n1 = builder.add_network_node(net("/"));

        let n2 = builder
            .add_node_with_dependencies(net("/a.js"), &[Dependency::explicit(n1)])
            .unwrap();
        assert_eq!(builder.edge_count(), 1);

        let forward = NodeId(n2.0 + 1);
        assert_eq!(
            builder.add_node_with_dependencies(net("/b.js"), &[Dependency::explicit(forward)]),
            Err(GraphConstructionError::UnknownNode(forward))
        );
        assert_eq!(builder.node_count(), 2);
    }

    #[test]
    fn test_build_rejects_cycle() {
        let mut builder = GraphBuilder::new();

        let n1 = builder.add_network_node(net("/"));
        let n2 = builder.add_network_node(net("/a.js"));
        let n3 = builder.add_network_node(net("/b.js"));

        builder.add_dependency(n2, n1, DependencyKind::Explicit).unwrap();
        builder.add_dependency(n3, n2, DependencyKind::Explicit).unwrap();
        builder.add_dependency(n2, n3, DependencyKind::Explicit).unwrap();

        assert!(matches!(
            builder.build(),
            Err(GraphConstructionError::Cycle { .. })
        ));
    }

    #[test]
    fn test_build_rejects_empty() {
        assert_eq!(
            GraphBuilder::new().build(),
            Err(GraphConstructionError::Empty)
        );
    }

    #[test]
    fn test_would_create_cycle_preview() {
        let mut builder = GraphBuilder::new();

        let n1 = builder.add_network_node(net("/"));
        let n2 = builder.add_network_node(net("/a.js"));
        let n3 = builder.add_network_node(net("/b.js"));

        builder.add_dependency(n2, n1, DependencyKind::Explicit).unwrap();
        builder.add_dependency(n3, n2, DependencyKind::Explicit).unwrap();

        // Preview: n1 depending on n3 would close the loop
        assert!(builder.would_create_cycle(n1, n3));

        // Preview: n3 depending on n1 is fine
        assert!(!builder.would_create_cycle(n3, n1));

        // Verify builder not modified
        assert_eq!(builder.edge_count(), 2);
    }

    #[test]
    fn test_root_has_maximum_reach_and_orphans_attach() {
        let mut builder = GraphBuilder::new();

        let lone = builder.add_cpu_node(CpuNode::new(3.0));
        let document = builder.add_network_node(net("/"));
        let script = builder.add_network_node(net("/a.js"));
        builder
            .add_dependency(script, document, DependencyKind::Initiator)
            .unwrap();

        let graph = builder.build().unwrap();

        assert_eq!(graph.root(), document);
        assert_eq!(
            graph.dependencies(lone),
            &[Dependency::new(document, DependencyKind::Synthetic)]
        );
        assert!(graph.is_acyclic());
    }
}
