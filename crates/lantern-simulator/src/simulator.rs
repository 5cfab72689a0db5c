//! Simulator
//!
//! Discrete-event replay of a [`Graph`] under [`ThrottlingSettings`].
//!
//! # Loop
//! 1. Admit ready nodes in id order: CPU nodes onto the single main-thread
//!    lane, network nodes onto a pooled connection
//! 2. Project every active node's completion under the current fair share
//! 3. Jump the clock to the soonest completion and advance all active work
//! 4. Complete every node finishing at that instant (id order), release its
//!    resource and promote dependents whose dependencies are all complete
//!
//! Time only moves in jumps between events and nothing reads a clock or a
//! random source, so the same graph and settings always give bit-identical
//! timings.

use crate::connection::{ConnectionId, Transfer};
use crate::dns::DnsCache;
use crate::error::SimulationConfigError;
use crate::pool::ConnectionPool;
use crate::settings::ThrottlingSettings;
use crate::timing::{ConnectionTiming, NodeTiming, Timing};
use lantern_graph::{Direction, Graph, NetworkNode, NodeId, NodePayload};
use std::collections::{BTreeMap, BTreeSet};

/// Nodes projected to finish within this of the event time complete with it
pub const COMPLETION_EPSILON_MS: f64 = 1e-6;

/// Node lifecycle inside one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Some dependency has not completed
    Pending,
    /// All dependencies complete, waiting for a resource
    Ready,
    /// Holding a connection or the CPU lane
    Active,
    Complete,
}

impl NodeState {
    /// States reachable from `self` in one step
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [NodeState] {
        use NodeState::{Active, Complete, Pending, Ready};
        match self {
            Pending => &[Ready],
            Ready => &[Active],
            Active => &[Complete],
            Complete => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, to: NodeState) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

/// Work a node does while active
#[derive(Debug, Clone)]
enum Work {
    Cpu {
        remaining_ms: f64,
    },
    Network {
        transfer: Transfer,
        connection: ConnectionId,
    },
}

impl Work {
    fn time_to_completion(&self, share_bytes_per_ms: f64) -> f64 {
        match self {
            Work::Cpu { remaining_ms } => *remaining_ms,
            Work::Network { transfer, .. } => transfer.time_to_completion(share_bytes_per_ms),
        }
    }

    fn advance(&mut self, dt: f64, share_bytes_per_ms: f64) {
        match self {
            Work::Cpu { remaining_ms } => *remaining_ms = (*remaining_ms - dt).max(0.0),
            Work::Network { transfer, .. } => {
                transfer.advance(dt, share_bytes_per_ms);
            }
        }
    }
}

/// Replays graphs under one validated set of throttling settings
#[derive(Debug, Clone)]
pub struct Simulator {
    settings: ThrottlingSettings,
}

impl Simulator {
    /// Validate `settings` and build a simulator
    pub fn new(settings: ThrottlingSettings) -> Result<Self, SimulationConfigError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    #[must_use]
    pub fn settings(&self) -> &ThrottlingSettings {
        &self.settings
    }

    /// Simulate one graph; the result borrows the graph
    pub fn simulate<'g>(&self, graph: &'g Graph) -> Result<NodeTiming<'g>, SimulationConfigError> {
        let visited = graph.traverse(Direction::FromRoot).count();
        if visited != graph.len() {
            return Err(SimulationConfigError::CyclicGraph {
                visited,
                total: graph.len(),
            });
        }

        let mut state = SimulationState::new(graph, &self.settings);
        state.run();
        Ok(NodeTiming::new(graph, state.into_timings()))
    }
}

/// Simulate `graph` under `settings`
pub fn simulate<'g>(
    graph: &'g Graph,
    settings: &ThrottlingSettings,
) -> Result<NodeTiming<'g>, SimulationConfigError> {
    Simulator::new(settings.clone())?.simulate(graph)
}

/// Mutable state of a single run; never shared between runs
struct SimulationState<'a> {
    graph: &'a Graph,
    settings: &'a ThrottlingSettings,
    link_bytes_per_ms: f64,
    now: f64,
    states: Vec<NodeState>,
    remaining_dependencies: Vec<usize>,
    queued: Vec<f64>,
    started: Vec<f64>,
    ended: Vec<f64>,
    connections: Vec<Option<ConnectionTiming>>,
    ready: BTreeSet<NodeId>,
    active: BTreeMap<NodeId, Work>,
    cpu_busy: Option<NodeId>,
    pool: ConnectionPool,
    dns: DnsCache,
    completed: usize,
    events: usize,
}

impl<'a> SimulationState<'a> {
    fn new(graph: &'a Graph, settings: &'a ThrottlingSettings) -> Self {
        let len = graph.len();
        let remaining_dependencies: Vec<usize> =
            graph.nodes().iter().map(|n| n.dependencies().len()).collect();

        let mut state = Self {
            graph,
            settings,
            link_bytes_per_ms: settings.throughput_bytes_per_ms(),
            now: 0.0,
            states: vec![NodeState::Pending; len],
            remaining_dependencies,
            queued: vec![0.0; len],
            started: vec![0.0; len],
            ended: vec![0.0; len],
            connections: vec![None; len],
            ready: BTreeSet::new(),
            active: BTreeMap::new(),
            cpu_busy: None,
            pool: ConnectionPool::new(settings.max_connections_per_origin),
            dns: DnsCache::new(),
            completed: 0,
            events: 0,
        };

        for index in 0..len {
            if state.remaining_dependencies[index] == 0 {
                let id = graph.nodes()[index].id();
                state.transition(id, NodeState::Ready);
                state.ready.insert(id);
            }
        }
        state
    }

    fn run(&mut self) {
        let total = self.graph.len();
        while self.completed < total {
            self.admit();
            assert!(
                !self.active.is_empty(),
                "simulation stalled at {}ms with {} of {} nodes complete",
                self.now,
                self.completed,
                total
            );

            let share = self.network_share();
            let projected: Vec<(NodeId, f64)> = self
                .active
                .iter()
                .map(|(&id, work)| (id, work.time_to_completion(share)))
                .collect();
            let dt = projected
                .iter()
                .map(|&(_, estimate)| estimate)
                .fold(f64::INFINITY, f64::min);
            assert!(dt.is_finite(), "no active node can finish at {}ms", self.now);

            for work in self.active.values_mut() {
                work.advance(dt, share);
            }
            self.now += dt;
            self.events += 1;

            for (id, estimate) in projected {
                if estimate - dt <= COMPLETION_EPSILON_MS {
                    self.complete(id);
                }
            }
        }

        tracing::debug!(
            "Simulated {} nodes in {} events: last end {}ms, {} connections opened",
            total,
            self.events,
            self.now,
            self.pool.connection_count()
        );
    }

    /// Fair share of the link per active network node (bytes/ms)
    #[allow(clippy::cast_precision_loss)]
    fn network_share(&self) -> f64 {
        let transfers = self
            .active
            .values()
            .filter(|work| matches!(work, Work::Network { .. }))
            .count();
        self.link_bytes_per_ms / transfers.max(1) as f64
    }

    fn admit(&mut self) {
        let ready: Vec<NodeId> = self.ready.iter().copied().collect();
        for id in ready {
            let graph = self.graph;
            let work = match graph.node(id).map(lantern_graph::Node::payload) {
                Some(NodePayload::Cpu(cpu)) => {
                    if self.cpu_busy.is_some() {
                        continue;
                    }
                    self.cpu_busy = Some(id);
                    let slowdown = self.settings.cpu_slowdown_multiplier;
                    Work::Cpu {
                        remaining_ms: cpu.duration_ms.max(0.0) * slowdown,
                    }
                }
                Some(NodePayload::Network(network)) => match self.start_request(id, network) {
                    Some(work) => work,
                    None => continue,
                },
                None => unreachable!("ready node {id} is not in the graph"),
            };

            self.ready.remove(&id);
            self.transition(id, NodeState::Active);
            self.started[id.index()] = self.now;
            self.active.insert(id, work);
            tracing::trace!("t={}ms start {}", self.now, id);
        }
    }

    fn start_request(&mut self, id: NodeId, network: &NetworkNode) -> Option<Work> {
        let lease = self.pool.acquire(network)?;
        let rtt = self.settings.rtt_for_origin(&network.origin);

        let mut timing = ConnectionTiming {
            connection_reused: !lease.fresh,
            ..ConnectionTiming::default()
        };
        if lease.fresh {
            timing.dns_resolution_ms = self.dns.resolve(&network.host(), self.now, rtt);
            timing.connect_ms = rtt;
            if network.is_secure() {
                timing.ssl_ms = rtt;
            }
        }
        timing.time_to_first_byte_ms = timing.dns_resolution_ms
            + timing.connect_ms
            + timing.ssl_ms
            + rtt
            + network.server_response_time_ms.max(0.0);
        self.connections[id.index()] = Some(timing);

        let transfer = Transfer::new(
            timing.time_to_first_byte_ms,
            network.transfer_size,
            rtt,
            lease.congestion_window,
            self.link_bytes_per_ms,
        );
        Some(Work::Network {
            transfer,
            connection: lease.connection,
        })
    }

    fn complete(&mut self, id: NodeId) {
        let work = self
            .active
            .remove(&id)
            .expect("completing node is active");
        match work {
            Work::Cpu { .. } => {
                assert_eq!(self.cpu_busy, Some(id), "CPU lane held by another node");
                self.cpu_busy = None;
            }
            Work::Network {
                transfer,
                connection,
            } => self.pool.release(connection, transfer.congestion_window()),
        }

        self.transition(id, NodeState::Complete);
        self.ended[id.index()] = self.now;
        self.completed += 1;
        tracing::trace!("t={}ms complete {}", self.now, id);

        let graph = self.graph;
        for &dependent in graph.dependents(id) {
            let remaining = &mut self.remaining_dependencies[dependent.index()];
            *remaining -= 1;
            if *remaining == 0 {
                self.transition(dependent, NodeState::Ready);
                self.queued[dependent.index()] = self.now;
                self.ready.insert(dependent);
            }
        }
    }

    fn transition(&mut self, id: NodeId, to: NodeState) {
        let state = &mut self.states[id.index()];
        assert!(
            state.can_transition_to(to),
            "illegal transition for node {id}: {state:?} -> {to:?}"
        );
        *state = to;
    }

    fn into_timings(self) -> Vec<Timing> {
        (0..self.graph.len())
            .map(|index| Timing {
                queued_time: self.queued[index],
                start_time: self.started[index],
                end_time: self.ended[index],
                connection: self.connections[index],
            })
            .collect()
    }
}
