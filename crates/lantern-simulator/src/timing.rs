//! Simulation results
//!
//! [`NodeTiming`] is the read-only output of one run: when every node was
//! queued, started and finished, plus connection costs for network nodes.
//! Metric code picks the nodes it cares about and reads their end times, or
//! walks the critical path that produced them.

use lantern_graph::{Graph, Node, NodeId};
use serde::Serialize;
use std::cmp::Ordering;

/// Connection costs paid by one network request (ms)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTiming {
    pub dns_resolution_ms: f64,
    pub connect_ms: f64,
    pub ssl_ms: f64,
    /// From start to the first response byte, handshake included
    pub time_to_first_byte_ms: f64,
    pub connection_reused: bool,
}

/// Simulated times of one node (ms since simulation start)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    /// All dependencies complete
    pub queued_time: f64,
    /// Resource acquired
    pub start_time: f64,
    pub end_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionTiming>,
}

impl Timing {
    #[inline]
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Time spent ready but waiting for a connection or the CPU lane
    #[inline]
    #[must_use]
    pub fn wait_time(&self) -> f64 {
        self.start_time - self.queued_time
    }
}

/// Per-node timings of one simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTiming<'g> {
    graph: &'g Graph,
    timings: Vec<Timing>,
}

impl<'g> NodeTiming<'g> {
    pub(crate) fn new(graph: &'g Graph, timings: Vec<Timing>) -> Self {
        debug_assert_eq!(graph.len(), timings.len());
        Self { graph, timings }
    }

    /// The graph these timings belong to
    #[must_use]
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    #[must_use]
    pub fn timing(&self, id: NodeId) -> Option<&Timing> {
        self.timings.get(id.index())
    }

    #[must_use]
    pub fn start_time_of(&self, id: NodeId) -> Option<f64> {
        self.timing(id).map(|t| t.start_time)
    }

    #[must_use]
    pub fn end_time_of(&self, id: NodeId) -> Option<f64> {
        self.timing(id).map(|t| t.end_time)
    }

    /// Every node with its timing, in id order
    pub fn iter(&self) -> impl Iterator<Item = (&'g Node, &Timing)> + '_ {
        self.graph.nodes().iter().zip(&self.timings)
    }

    /// When the last node finished
    #[must_use]
    pub fn last_end_time(&self) -> f64 {
        self.timings
            .iter()
            .map(|t| t.end_time)
            .fold(0.0, f64::max)
    }

    /// The chain of nodes that determined when `id` finished, root first
    ///
    /// Walks dependencies backwards, each step taking the dependency that
    /// ended latest (lowest id on ties).
    #[must_use]
    pub fn critical_path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = match self.graph.node(id) {
            Some(node) => node.id(),
            None => return path,
        };
        path.push(current);

        loop {
            let gating = self
                .graph
                .dependencies(current)
                .iter()
                .map(|dep| dep.node)
                .reduce(|best, candidate| {
                    let best_end = self.timings[best.index()].end_time;
                    let candidate_end = self.timings[candidate.index()].end_time;
                    match candidate_end.total_cmp(&best_end) {
                        Ordering::Greater => candidate,
                        Ordering::Equal if candidate < best => candidate,
                        _ => best,
                    }
                });
            match gating {
                Some(next) => {
                    path.push(next);
                    current = next;
                }
                None => break,
            }
        }

        path.reverse();
        path
    }

    /// Bytes downloaded by network nodes on the critical path to `id`
    #[must_use]
    pub fn total_transfer_bytes_on_critical_path(&self, id: NodeId) -> u64 {
        self.critical_path_to(id)
            .into_iter()
            .filter_map(|id| self.graph.node(id).and_then(Node::as_network))
            .map(|network| network.transfer_size)
            .sum()
    }
}
