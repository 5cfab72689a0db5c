//! End-to-end simulation scenarios

use lantern_graph::{
    DependencyKind, Direction, GraphBuilder, NetworkNode, NodeId, NodeKind, PageGraphBuilder,
    Protocol,
};
use lantern_simulator::{simulate, simulate_variants, Simulator, ThrottlingSettings};
use lantern_test_utils::{cpu_chain, dag, fan_out, redirect_chain, sample_page_load, FixtureNode};
use pretty_assertions::assert_eq;

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} (+/- {tolerance}), got {actual}"
    );
}

/// Tenet: redirect hops run strictly one after another
#[test]
fn test_two_sequential_redirects() {
    let graph = redirect_chain(2, 100.0);
    let timing = simulate(&graph, &ThrottlingSettings::unthrottled()).unwrap();

    assert_close(timing.start_time_of(NodeId(0)).unwrap(), 0.0, 1e-9);
    assert_close(timing.end_time_of(NodeId(0)).unwrap(), 100.0, 1e-6);
    assert_close(timing.end_time_of(NodeId(1)).unwrap(), 200.0, 1e-6);
    assert_close(timing.end_time_of(NodeId(2)).unwrap(), 300.0, 1e-6);
    assert_eq!(timing.critical_path_to(NodeId(2)), vec![NodeId(0), NodeId(1), NodeId(2)]);
}

/// Tenet: concurrent transfers split the link evenly
#[test]
fn test_parallel_downloads_share_bandwidth() {
    let graph = fan_out(2, 1_000_000);
    // 8000 kbps = 1,000,000 bytes/s
    let settings = ThrottlingSettings::unthrottled()
        .with_throughput(8000.0)
        .with_max_connections_per_origin(64);
    let timing = simulate(&graph, &settings).unwrap();

    for child in [NodeId(1), NodeId(2)] {
        assert_close(timing.start_time_of(child).unwrap(), 0.0, 1e-6);
        assert_close(timing.end_time_of(child).unwrap(), 2000.0, 1e-3);
    }
}

/// Tenet: CPU work is multiplied by the slowdown
#[test]
fn test_cpu_slowdown_multiplies_duration() {
    let graph = cpu_chain(&[100.0]);
    let settings = ThrottlingSettings::unthrottled().with_cpu_slowdown(4.0);
    let timing = simulate(&graph, &settings).unwrap();

    let task = timing.timing(NodeId(1)).unwrap();
    assert_close(task.duration(), 400.0, 1e-6);
    assert_close(timing.last_end_time(), 400.0, 1e-6);
}

/// Tenet: a warm connection skips DNS, TCP and TLS
#[test]
fn test_connection_reuse_saves_handshake() {
    let mut builder = GraphBuilder::new();
    let first = builder.add_network_node(NetworkNode::new("https://a.test/", 1000));
    let second = builder.add_network_node(NetworkNode::new("https://a.test/app.js", 1000));
    builder.add_dependency(second, first, DependencyKind::Initiator).unwrap();
    let graph = builder.build().unwrap();

    let settings = ThrottlingSettings::unthrottled().with_rtt(50.0);
    let timing = simulate(&graph, &settings).unwrap();
    let cold = timing.timing(first).unwrap().connection.unwrap();
    let warm = timing.timing(second).unwrap().connection.unwrap();

    assert!(!cold.connection_reused);
    assert!(warm.connection_reused);
    assert_close(cold.time_to_first_byte_ms, 100.0 + 50.0 + 50.0 + 50.0, 1e-9);
    assert_close(warm.time_to_first_byte_ms, 50.0, 1e-9);
    assert_close(warm.dns_resolution_ms + warm.connect_ms + warm.ssl_ms, 0.0, 1e-12);
}

/// Tenet: an origin never has more requests in flight than its ceiling
#[test]
fn test_connection_limit_queues_requests() {
    let graph = fan_out(5, 10_000);
    let settings = ThrottlingSettings::unthrottled()
        .with_throughput(800.0)
        .with_max_connections_per_origin(2);
    let timing = simulate(&graph, &settings).unwrap();

    let mut starts: Vec<f64> = (1..=5).map(|i| timing.start_time_of(NodeId(i)).unwrap()).collect();
    starts.sort_by(f64::total_cmp);
    assert_close(starts[0], 0.0, 1e-9);
    assert_close(starts[1], 0.0, 1e-9);
    assert!(starts[2] > 0.0);

    // Waiting nodes were queued at 0 and started later
    let waited = (1..=5)
        .filter(|&i| timing.timing(NodeId(i)).unwrap().wait_time() > 0.0)
        .count();
    assert_eq!(waited, 3);
}

/// Tenet: an explicit default port names the same origin as no port
#[test]
fn test_default_port_shares_origin_ceiling() {
    let mut builder = GraphBuilder::new();
    let root = builder.add_network_node(NetworkNode::new("https://a.test/", 0));
    let x = builder.add_network_node(NetworkNode::new("https://a.test/x", 100_000));
    let y = builder.add_network_node(NetworkNode::new("https://a.test:443/y", 100_000));
    builder.add_dependency(x, root, DependencyKind::Initiator).unwrap();
    builder.add_dependency(y, root, DependencyKind::Initiator).unwrap();
    let graph = builder.build().unwrap();

    let origin_of = |id| graph.node(id).unwrap().as_network().unwrap().origin.clone();
    assert_eq!(origin_of(x), origin_of(y));

    let settings = ThrottlingSettings::unthrottled()
        .with_rtt(10.0)
        .with_throughput(8000.0)
        .with_max_connections_per_origin(1);
    let timing = simulate(&graph, &settings).unwrap();

    let x_timing = timing.timing(x).unwrap();
    let y_timing = timing.timing(y).unwrap();
    assert_close(x_timing.start_time, 50.0, 1e-9);
    assert!(y_timing.start_time >= x_timing.end_time - 1e-9);
    assert!(y_timing.wait_time() > 0.0);
}

/// Tenet: a cold H2 connection serializes, a warm one multiplexes
#[test]
fn test_h2_multiplexes_once_warm() {
    let h2 = |origin| FixtureNode::Network {
        origin,
        bytes: 5_000,
        protocol: Protocol::H2,
        reusable: true,
        server_response_time_ms: 10.0,
    };
    let graph = dag(&[
        (h2(0), vec![]),
        (h2(0), vec![0]),
        (h2(0), vec![0]),
        (h2(0), vec![0]),
    ]);
    let settings = ThrottlingSettings::desktop_dense_4g();
    let timing = simulate(&graph, &settings).unwrap();

    let root_end = timing.end_time_of(NodeId(0)).unwrap();
    for id in 1..=3 {
        let node = timing.timing(NodeId(id)).unwrap();
        assert_close(node.start_time, root_end, 1e-9);
        assert!(node.connection.unwrap().connection_reused);
    }
}

/// Tenet: per-origin latency overrides only slow their origin
#[test]
fn test_additional_rtt_applies_per_origin() {
    let graph = dag(&[
        (FixtureNode::network(0, 0), vec![]),
        (FixtureNode::network(0, 0), vec![0]),
        (FixtureNode::network(1, 0), vec![0]),
    ]);
    let settings = ThrottlingSettings::unthrottled()
        .with_rtt(10.0)
        .with_additional_rtt("https://cdn.test", 90.0);
    let timing = simulate(&graph, &settings).unwrap();

    let same_origin = timing.timing(NodeId(1)).unwrap().duration();
    let cdn = timing.timing(NodeId(2)).unwrap().connection.unwrap();
    assert_close(same_origin, 10.0, 1e-9);
    assert_close(cdn.dns_resolution_ms, 200.0, 1e-9);
    assert_close(cdn.connect_ms, 100.0, 1e-9);
}

/// Tenet: a real recorded load replays end to end
#[test]
fn test_sample_page_load_replays() {
    let graph = PageGraphBuilder::new().build(&sample_page_load()).unwrap();
    assert_eq!(graph.count_of(NodeKind::Cpu), 4);

    let simulator = Simulator::new(ThrottlingSettings::mobile_slow_4g()).unwrap();
    let timing = simulator.simulate(&graph).unwrap();

    for node in graph.traverse(Direction::FromRoot) {
        let start = timing.start_time_of(node.id()).unwrap();
        for dep in node.dependencies() {
            assert!(timing.end_time_of(dep.node).unwrap() <= start + 1e-9);
        }
    }

    let last = graph
        .nodes()
        .iter()
        .map(|n| n.id())
        .max_by(|a, b| {
            timing
                .end_time_of(*a)
                .unwrap()
                .total_cmp(&timing.end_time_of(*b).unwrap())
        })
        .unwrap();
    let path = timing.critical_path_to(last);
    assert_eq!(path.first(), Some(&graph.root()));
    assert_eq!(path.last(), Some(&last));
    assert!(timing.total_transfer_bytes_on_critical_path(last) > 0);

    // Slower settings never make the page faster
    let desktop = simulate(&graph, &ThrottlingSettings::desktop_dense_4g()).unwrap();
    assert!(desktop.last_end_time() < timing.last_end_time());

    let estimate = simulate_variants(&graph, &ThrottlingSettings::mobile_slow_4g()).unwrap();
    assert!(estimate.optimistic_ms <= estimate.pessimistic_ms + 1e-9);
    assert_close(estimate.pessimistic_ms, timing.last_end_time(), 1e-9);
}
