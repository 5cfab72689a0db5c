//! Testing utilities for the Lantern workspace
//!
//! Shared graph and page-load fixtures.

#![allow(missing_docs)]

use lantern_graph::{
    CpuNode, Dependency, DependencyKind, Graph, GraphBuilder, NetworkNode, NetworkRequest, NodeId,
    PageLoad, Protocol, ResourceType, TaskKind, TraceTask,
};

pub const ORIGINS: [&str; 3] = ["https://a.test", "https://cdn.test", "http://ads.test"];

/// Node description for [`dag`]
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureNode {
    Network {
        origin: usize,
        bytes: u64,
        protocol: Protocol,
        reusable: bool,
        server_response_time_ms: f64,
    },
    Cpu {
        duration_ms: f64,
    },
}

impl FixtureNode {
    #[must_use]
    pub fn network(origin: usize, bytes: u64) -> Self {
        FixtureNode::Network {
            origin,
            bytes,
            protocol: Protocol::H1,
            reusable: true,
            server_response_time_ms: 0.0,
        }
    }

    #[must_use]
    pub fn cpu(duration_ms: f64) -> Self {
        FixtureNode::Cpu { duration_ms }
    }
}

/// Build an acyclic graph: node `i` depends on `deps[k] % i` for each listed dep
///
/// Node 0 is the root. Dependencies always point backwards so any input is a
/// valid DAG.
pub fn dag(nodes: &[(FixtureNode, Vec<usize>)]) -> Graph {
    let mut builder = GraphBuilder::with_capacity(nodes.len());
    for (index, (node, deps)) in nodes.iter().enumerate() {
        let dependencies: Vec<Dependency> = if index == 0 {
            Vec::new()
        } else {
            deps.iter()
                .map(|&d| Dependency::explicit(NodeId((d % index) as u32)))
                .collect()
        };
        let payload = match node {
            FixtureNode::Network {
                origin,
                bytes,
                protocol,
                reusable,
                server_response_time_ms,
            } => {
                let origin = ORIGINS[origin % ORIGINS.len()];
                lantern_graph::NodePayload::Network(
                    NetworkNode::new(format!("{origin}/r{index}"), *bytes)
                        .with_protocol(*protocol)
                        .with_connection_reusable(*reusable)
                        .with_server_response_time(*server_response_time_ms)
                        .with_request_id(index.to_string()),
                )
            }
            FixtureNode::Cpu { duration_ms } => {
                lantern_graph::NodePayload::Cpu(CpuNode::new(*duration_ms))
            }
        };
        builder
            .add_node_with_dependencies(payload, &dependencies)
            .expect("fixture dependencies point backwards");
    }
    builder.build().expect("fixture graph is valid")
}

/// Document followed by `hops` redirects, each hop taking `server_ms`
pub fn redirect_chain(hops: usize, server_ms: f64) -> Graph {
    let mut builder = GraphBuilder::new();
    let mut previous: Option<NodeId> = None;
    for hop in 0..=hops {
        let node = NetworkNode::new(format!("https://a.test/hop{hop}"), 0)
            .with_resource_type(ResourceType::Document)
            .with_server_response_time(server_ms)
            .with_redirect_position(hop as u32);
        let id = builder.add_network_node(node);
        if let Some(previous) = previous {
            builder
                .add_dependency(id, previous, DependencyKind::Redirect)
                .expect("chain nodes exist");
        }
        previous = Some(id);
    }
    builder.build().expect("chain is valid")
}

/// Root document plus `children` independent downloads of `bytes` each, same origin
pub fn fan_out(children: usize, bytes: u64) -> Graph {
    let mut builder = GraphBuilder::new();
    let root = builder.add_network_node(
        NetworkNode::new("https://a.test/", 0).with_resource_type(ResourceType::Document),
    );
    for child in 0..children {
        builder
            .add_node_with_dependencies(
                NetworkNode::new(format!("https://a.test/asset{child}.bin"), bytes),
                &[Dependency::new(root, DependencyKind::Initiator)],
            )
            .expect("root exists");
    }
    builder.build().expect("fan-out is valid")
}

/// Root document followed by a chain of CPU tasks
pub fn cpu_chain(durations_ms: &[f64]) -> Graph {
    let mut builder = GraphBuilder::new();
    let mut previous = builder.add_network_node(NetworkNode::new("https://a.test/", 0));
    for &duration in durations_ms {
        previous = builder
            .add_node_with_dependencies(
                CpuNode::new(duration),
                &[Dependency::new(previous, DependencyKind::Evaluation)],
            )
            .expect("previous node exists");
    }
    builder.build().expect("chain is valid")
}

/// A small but complete recorded page load
///
/// Document, a stylesheet and script it discovers, an image the script
/// requests, plus parse, evaluation, layout and paint tasks.
pub fn sample_page_load() -> PageLoad {
    PageLoad {
        requests: vec![
            NetworkRequest::new("1", "http://a.test/", 0.0, 60.0)
                .with_resource_type(ResourceType::Document),
            NetworkRequest::new("2", "https://a.test/", 60.0, 300.0)
                .with_resource_type(ResourceType::Document)
                .with_redirect_source("1")
                .with_transfer_size(24_000)
                .with_server_response_time(80.0),
            NetworkRequest::new("3", "https://a.test/site.css", 320.0, 420.0)
                .with_resource_type(ResourceType::Stylesheet)
                .with_initiator_url("https://a.test/")
                .with_transfer_size(18_000),
            NetworkRequest::new("4", "https://cdn.test/app.js", 325.0, 520.0)
                .with_resource_type(ResourceType::Script)
                .with_initiator_url("https://a.test/")
                .with_protocol(Protocol::H2)
                .with_transfer_size(120_000),
            NetworkRequest::new("5", "https://cdn.test/hero.jpg", 600.0, 800.0)
                .with_resource_type(ResourceType::Image)
                .with_initiator_url("https://cdn.test/app.js")
                .with_protocol(Protocol::H2)
                .with_transfer_size(90_000),
        ],
        tasks: vec![
            TraceTask::new(305.0, 12.0, TaskKind::ParseHtml).with_attribution("https://a.test/"),
            TraceTask::new(530.0, 140.0, TaskKind::ScriptEvaluation)
                .with_attribution("https://cdn.test/app.js"),
            TraceTask::new(680.0, 0.3, TaskKind::Other),
            TraceTask::new(690.0, 25.0, TaskKind::Layout),
            TraceTask::new(720.0, 8.0, TaskKind::Paint),
        ],
    }
}
