use lantern_graph::{
    CpuNode, DependencyKind, Direction, GraphBuilder, GraphConstructionError, NetworkNode,
    NetworkRequest, NodeId, NodeKind, PageGraphBuilder, PageLoad, ResourceType, TaskKind,
    TraceTask,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Reference check: Kahn's algorithm over the raw edge list
fn has_cycle(node_count: usize, edges: &[(usize, usize)]) -> bool {
    let mut indegree = vec![0usize; node_count];
    let mut out = vec![Vec::new(); node_count];
    for &(dependent, dependency) in edges {
        indegree[dependent] += 1;
        out[dependency].push(dependent);
    }
    let mut ready: Vec<usize> = (0..node_count).filter(|&n| indegree[n] == 0).collect();
    let mut seen = 0;
    while let Some(n) = ready.pop() {
        seen += 1;
        for &next in &out[n] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push(next);
            }
        }
    }
    seen != node_count
}

proptest! {
    #[test]
    fn prop_build_rejects_exactly_the_cyclic_inputs(
        node_count in 1..20usize,
        raw_edges in proptest::collection::vec((0..20usize, 0..20usize), 0..50)
    ) {
        let mut builder = GraphBuilder::new();
        for index in 0..node_count {
            builder.add_network_node(NetworkNode::new(format!("https://a.test/{index}"), 100));
        }

        let mut edges = Vec::new();
        for (dependent, dependency) in raw_edges {
            if dependent < node_count && dependency < node_count && dependent != dependency {
                #[allow(clippy::cast_possible_truncation)]
                builder
                    .add_dependency(
                        NodeId(dependent as u32),
                        NodeId(dependency as u32),
                        DependencyKind::Explicit,
                    )
                    .unwrap();
                edges.push((dependent, dependency));
            }
        }

        let cyclic = has_cycle(node_count, &edges);
        match builder.build() {
            Ok(graph) => {
                prop_assert!(!cyclic);
                // Single root, every node reachable in topological order
                prop_assert_eq!(graph.traverse(Direction::FromRoot).count(), node_count);
                prop_assert!(graph.dependencies(graph.root()).is_empty());
                let roots = graph.nodes().iter().filter(|n| n.dependencies().is_empty()).count();
                prop_assert_eq!(roots, 1);
            }
            Err(GraphConstructionError::Cycle { .. }) => prop_assert!(cyclic),
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }

    #[test]
    fn prop_traversal_respects_dependencies(
        deps in proptest::collection::vec(proptest::collection::vec(0..64usize, 0..3), 1..30)
    ) {
        let mut builder = GraphBuilder::new();
        for (index, node_deps) in deps.iter().enumerate() {
            let id = builder.add_cpu_node(CpuNode::new(1.0));
            if index > 0 {
                for &dep in node_deps {
                    #[allow(clippy::cast_possible_truncation)]
                    builder
                        .add_dependency(id, NodeId((dep % index) as u32), DependencyKind::Explicit)
                        .unwrap();
                }
            }
        }
        let graph = builder.build().unwrap();

        let mut position = vec![usize::MAX; graph.len()];
        for (order, node) in graph.traverse(Direction::FromRoot).enumerate() {
            position[node.id().index()] = order;
        }
        for node in graph.nodes() {
            for dep in node.dependencies() {
                prop_assert!(position[dep.node.index()] < position[node.id().index()]);
            }
        }

        // Restartable and stable
        let first: Vec<NodeId> = graph.traverse(Direction::FromRoot).map(|n| n.id()).collect();
        let second: Vec<NodeId> = graph.traverse(Direction::FromRoot).map(|n| n.id()).collect();
        prop_assert_eq!(first, second);
    }
}

/// Tenet: a recorded load becomes one rooted graph with inferred edges
#[test]
fn test_page_load_becomes_rooted_graph() {
    let page = PageLoad {
        requests: vec![
            NetworkRequest::new("doc", "https://a.test/", 0.0, 200.0)
                .with_resource_type(ResourceType::Document)
                .with_transfer_size(30_000),
            NetworkRequest::new("css", "https://a.test/site.css", 210.0, 300.0)
                .with_resource_type(ResourceType::Stylesheet)
                .with_initiator_url("https://a.test/"),
            NetworkRequest::new("js", "https://cdn.test/app.js", 215.0, 400.0)
                .with_resource_type(ResourceType::Script)
                .with_initiator_request("doc"),
            // No initiator at all: hangs off the document
            NetworkRequest::new("beacon", "https://ads.test/b", 900.0, 950.0),
        ],
        tasks: vec![
            TraceTask::new(205.0, 4.0, TaskKind::ParseHtml).with_attribution("https://a.test/"),
            TraceTask::new(410.0, 90.0, TaskKind::ScriptEvaluation)
                .with_attribution("https://cdn.test/app.js"),
            TraceTask::new(505.0, 0.2, TaskKind::Other),
            TraceTask::new(510.0, 20.0, TaskKind::Paint),
        ],
    };

    let graph = PageGraphBuilder::new().build(&page).unwrap();

    assert_eq!(graph.len(), 7);
    assert_eq!(graph.count_of(NodeKind::Network), 4);
    assert_eq!(graph.count_of(NodeKind::Cpu), 3);
    assert_eq!(graph.root(), NodeId(0));
    assert_eq!(graph.main_document().unwrap().request_id, "doc");
    assert_eq!(graph.total_transfer_bytes(), 30_000);

    let kinds = |id: u32| -> Vec<(NodeId, DependencyKind)> {
        graph
            .dependencies(NodeId(id))
            .iter()
            .map(|dep| (dep.node, dep.kind))
            .collect()
    };
    assert_eq!(kinds(1), vec![(NodeId(0), DependencyKind::Initiator)]);
    assert_eq!(kinds(2), vec![(NodeId(0), DependencyKind::Initiator)]);
    assert_eq!(kinds(3), vec![(NodeId(0), DependencyKind::Initiator)]);
    assert_eq!(kinds(4), vec![(NodeId(0), DependencyKind::Evaluation)]);
    assert_eq!(kinds(5), vec![(NodeId(2), DependencyKind::Evaluation)]);
    assert_eq!(kinds(6), vec![(NodeId(5), DependencyKind::RenderBlocking)]);
}

/// Tenet: the noise threshold is configurable
#[test]
fn test_task_threshold_is_configurable() {
    let page = PageLoad {
        requests: vec![NetworkRequest::new("doc", "https://a.test/", 0.0, 10.0)
            .with_resource_type(ResourceType::Document)],
        tasks: vec![
            TraceTask::new(20.0, 3.0, TaskKind::Other),
            TraceTask::new(30.0, 8.0, TaskKind::Other),
        ],
    };

    let config = lantern_graph::GraphBuilderConfig::new().with_minimum_task_duration(5.0);
    let graph = PageGraphBuilder::with_config(config).build(&page).unwrap();
    assert_eq!(graph.count_of(NodeKind::Cpu), 1);

    let everything = PageGraphBuilder::new().build(&page).unwrap();
    assert_eq!(everything.count_of(NodeKind::Cpu), 2);
}

/// Tenet: malformed records never produce a graph
#[test]
fn test_empty_page_load_is_rejected() {
    assert_eq!(
        PageGraphBuilder::new().build(&PageLoad::default()),
        Err(GraphConstructionError::Empty)
    );
}

#[test]
fn test_page_load_round_trips_through_json() {
    let json = r#"{
        "requests": [
            {"requestId": "a", "url": "https://a.test/", "resourceType": "document",
             "startTimeMs": 0, "endTimeMs": 50},
            {"requestId": "b", "url": "https://a.test/next", "resourceType": "document",
             "redirectSource": "a", "startTimeMs": 50, "endTimeMs": 90}
        ]
    }"#;
    let page: PageLoad = serde_json::from_str(json).unwrap();
    let graph = PageGraphBuilder::new().build(&page).unwrap();

    assert_eq!(
        graph.dependencies(NodeId(1))[0].kind,
        DependencyKind::Redirect
    );
    assert_eq!(graph.node(NodeId(1)).unwrap().as_network().unwrap().redirect_position, 1);
}
