//! Lantern Graph (lantern-graph)
//!
//! Dependency graph of a page load, in two phases:
//! 1. **Construction**: collect nodes and edges, reject cycles, pick the root
//! 2. **Consumption**: traverse, inspect, or derive relaxed/strict variants
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lantern_graph::prelude::*;
//!
//! let page: PageLoad = serde_json::from_str(&recorded)?;
//! let graph = PageGraphBuilder::new().build(&page)?;
//!
//! for node in graph.traverse(Direction::FromRoot) {
//!     println!("{} {}", node.id(), node.label());
//! }
//!
//! let optimistic = graph.clone_with_relaxed_dependencies();
//! ```

pub mod builder;
pub mod error;
pub mod graph;
pub mod node;
pub mod page;
pub mod record;

// Re-exports
pub use builder::GraphBuilder;
pub use error::GraphConstructionError;
pub use graph::{Direction, Graph, Traversal};
pub use node::{
    origin_of, CpuNode, Dependency, DependencyKind, NetworkNode, Node, NodeId, NodeKind,
    NodePayload,
};
pub use page::{GraphBuilderConfig, PageGraphBuilder};
pub use record::{NetworkRequest, PageLoad, Protocol, ResourceType, TaskKind, TraceTask};

/// Commonly used types
pub mod prelude {
    pub use crate::builder::GraphBuilder;
    pub use crate::error::GraphConstructionError;
    pub use crate::graph::{Direction, Graph};
    pub use crate::node::{
        CpuNode, Dependency, DependencyKind, NetworkNode, Node, NodeId, NodeKind, NodePayload,
    };
    pub use crate::page::{GraphBuilderConfig, PageGraphBuilder};
    pub use crate::record::{NetworkRequest, PageLoad, Protocol, ResourceType, TaskKind, TraceTask};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
