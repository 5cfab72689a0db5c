//! Node Model
//!
//! Vertices of the page dependency graph. A node is either a network fetch or
//! a main-thread CPU task; edges are strict "must finish before" dependencies.
//!
//! Nodes live in a flat arena owned by [`crate::Graph`] and refer to each other
//! by [`NodeId`] only, so cloning a graph variant is a bulk copy of arrays.

use crate::record::{Protocol, ResourceType, TaskKind};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use url::Url;

/// Dense node identifier (index into the graph arena)
///
/// Ids are assigned in insertion order and are the deterministic tie-breaker
/// everywhere two nodes would otherwise be equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Arena index of this node
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).expect("graph arena exceeds u32::MAX nodes"))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind tag of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Network,
    Cpu,
}

/// Why one node must finish before another may start
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Redirect hop `n` waits for hop `n - 1`
    Redirect,
    /// Request discovered by an earlier document or script request
    Initiator,
    /// Request issued while a CPU task was executing
    ScriptInitiated,
    /// CPU task evaluating or parsing a downloaded resource
    Evaluation,
    /// Task fired by a timer another task installed
    Timer,
    /// CPU task blocking dependent render work (dropped in optimistic graphs)
    RenderBlocking,
    /// Caller-supplied edge with no inferred meaning
    Explicit,
    /// Zero-cost edge attaching an orphaned component to the root
    Synthetic,
}

impl DependencyKind {
    /// Whether an optimistic graph variant drops this edge
    #[inline]
    #[must_use]
    pub fn is_relaxable(self) -> bool {
        matches!(self, DependencyKind::RenderBlocking)
    }
}

/// A dependency edge as seen from the dependent node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// The node that must complete first
    pub node: NodeId,
    /// Why the edge exists
    pub kind: DependencyKind,
}

impl Dependency {
    #[inline]
    #[must_use]
    pub fn new(node: NodeId, kind: DependencyKind) -> Self {
        Self { node, kind }
    }

    /// Caller-supplied dependency
    #[inline]
    #[must_use]
    pub fn explicit(node: NodeId) -> Self {
        Self::new(node, DependencyKind::Explicit)
    }
}

/// Network fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    /// Request id from the network log
    pub request_id: String,
    pub url: String,
    /// `scheme://host[:port]`, default ports elided
    pub origin: String,
    pub resource_type: ResourceType,
    /// Bytes transferred over the wire
    pub transfer_size: u64,
    pub protocol: Protocol,
    /// Whether a prior connection to the same origin may carry this request
    pub is_connection_reusable: bool,
    /// Server think time before the first byte (ms)
    pub server_response_time_ms: f64,
    /// 0 unless this request is the target of a redirect
    pub redirect_position: u32,
    /// Recorded start time in the observed load (ms)
    pub start_time_ms: f64,
    /// Recorded end time in the observed load (ms)
    pub end_time_ms: f64,
}

impl NetworkNode {
    /// Create a network node for `url` with the given transfer size
    ///
    /// The origin is derived from the URL; everything else takes neutral
    /// defaults and can be adjusted with the `with_*` methods.
    #[must_use]
    pub fn new(url: impl Into<String>, transfer_size: u64) -> Self {
        let url = url.into();
        Self {
            request_id: String::new(),
            origin: origin_of(&url),
            url,
            resource_type: ResourceType::Other,
            transfer_size,
            protocol: Protocol::H1,
            is_connection_reusable: true,
            server_response_time_ms: 0.0,
            redirect_position: 0,
            start_time_ms: 0.0,
            end_time_ms: 0.0,
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    #[must_use]
    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn with_server_response_time(mut self, ms: f64) -> Self {
        self.server_response_time_ms = ms;
        self
    }

    #[must_use]
    pub fn with_connection_reusable(mut self, reusable: bool) -> Self {
        self.is_connection_reusable = reusable;
        self
    }

    #[must_use]
    pub fn with_redirect_position(mut self, position: u32) -> Self {
        self.redirect_position = position;
        self
    }

    #[must_use]
    pub fn with_recorded_times(mut self, start_ms: f64, end_ms: f64) -> Self {
        self.start_time_ms = start_ms;
        self.end_time_ms = end_ms;
        self
    }

    /// TLS is charged for `https` and `wss` origins
    #[must_use]
    pub fn is_secure(&self) -> bool {
        Url::parse(&self.origin).is_ok_and(|origin| matches!(origin.scheme(), "https" | "wss"))
    }

    /// Host portion of the origin, used as the DNS cache key
    #[must_use]
    pub fn host(&self) -> String {
        Url::parse(&self.origin)
            .ok()
            .and_then(|origin| origin.host_str().map(str::to_string))
            .unwrap_or_else(|| self.origin.clone())
    }

    #[must_use]
    pub fn is_redirect_target(&self) -> bool {
        self.redirect_position > 0
    }
}

/// Main-thread task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuNode {
    /// Unthrottled duration (ms)
    pub duration_ms: f64,
    /// Script or document responsible; reporting only
    pub attributed_url: Option<String>,
    pub task_kind: TaskKind,
    /// Recorded start time in the observed load (ms)
    pub start_time_ms: f64,
}

impl CpuNode {
    #[must_use]
    pub fn new(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            attributed_url: None,
            task_kind: TaskKind::Other,
            start_time_ms: 0.0,
        }
    }

    #[must_use]
    pub fn with_attribution(mut self, url: impl Into<String>) -> Self {
        self.attributed_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_task_kind(mut self, kind: TaskKind) -> Self {
        self.task_kind = kind;
        self
    }

    #[must_use]
    pub fn with_start_time(mut self, start_ms: f64) -> Self {
        self.start_time_ms = start_ms;
        self
    }

    /// Recorded end time in the observed load (ms)
    #[must_use]
    pub fn end_time_ms(&self) -> f64 {
        self.start_time_ms + self.duration_ms
    }
}

/// Node payload: the per-kind data carried by a vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodePayload {
    Network(NetworkNode),
    Cpu(CpuNode),
}

impl NodePayload {
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            NodePayload::Network(_) => NodeKind::Network,
            NodePayload::Cpu(_) => NodeKind::Cpu,
        }
    }
}

impl From<NetworkNode> for NodePayload {
    fn from(value: NetworkNode) -> Self {
        NodePayload::Network(value)
    }
}

impl From<CpuNode> for NodePayload {
    fn from(value: CpuNode) -> Self {
        NodePayload::Cpu(value)
    }
}

pub(crate) type DependencyList = SmallVec<[Dependency; 4]>;
pub(crate) type DependentList = SmallVec<[NodeId; 4]>;

/// A vertex placed in a [`crate::Graph`]; immutable once placed
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    payload: NodePayload,
    dependencies: DependencyList,
    dependents: DependentList,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        payload: NodePayload,
        dependencies: DependencyList,
        dependents: DependentList,
    ) -> Self {
        Self {
            id,
            payload,
            dependencies,
            dependents,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &NodePayload {
        &self.payload
    }

    #[must_use]
    pub fn as_network(&self) -> Option<&NetworkNode> {
        match &self.payload {
            NodePayload::Network(network) => Some(network),
            NodePayload::Cpu(_) => None,
        }
    }

    #[must_use]
    pub fn as_cpu(&self) -> Option<&CpuNode> {
        match &self.payload {
            NodePayload::Cpu(cpu) => Some(cpu),
            NodePayload::Network(_) => None,
        }
    }

    /// Nodes that must complete before this one starts, sorted by id
    #[inline]
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Nodes waiting on this one, sorted by id
    #[inline]
    #[must_use]
    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    /// Short label for logs and reports
    #[must_use]
    pub fn label(&self) -> String {
        match &self.payload {
            NodePayload::Network(network) => network.url.clone(),
            NodePayload::Cpu(cpu) => match &cpu.attributed_url {
                Some(url) => format!("{:?} task ({url})", cpu.task_kind),
                None => format!("{:?} task", cpu.task_kind),
            },
        }
    }
}

/// Serialized origin of a URL (`scheme://host[:port]`, default ports elided)
///
/// Opaque or unparseable URLs are their own origin.
#[must_use]
pub fn origin_of(url: &str) -> String {
    match Url::parse(url).map(|parsed| parsed.origin()) {
        Ok(origin) if origin.is_tuple() => origin.ascii_serialization(),
        _ => url.to_string(),
    }
}
