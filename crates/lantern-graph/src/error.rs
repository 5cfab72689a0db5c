//! Error types for graph construction

use crate::node::NodeId;

/// Malformed input that cannot become a single rooted DAG
///
/// Always fatal: a graph with silently dropped edges would produce timings
/// that are wrong in ways nothing downstream can detect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphConstructionError {
    /// Nothing to build
    #[error("graph has no nodes")]
    Empty,

    /// The dependency edges contain a cycle
    #[error("dependency cycle through node {node}")]
    Cycle { node: NodeId },

    /// An edge refers to a node that was never added
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A node was asked to depend on itself
    #[error("node {0} cannot depend on itself")]
    SelfLoop(NodeId),

    /// Two network records share a request id
    #[error("duplicate request id: {0}")]
    DuplicateRequestId(String),

    /// A redirect points back at a request that is not in the log
    #[error("request {request_id} redirects from unknown request {redirect_source}")]
    UnknownRedirectSource {
        request_id: String,
        redirect_source: String,
    },
}
