use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use lantern_graph::{Graph, NodeKind, PageGraphBuilder, PageLoad};
use lantern_simulator::{Simulator, ThrottlingSettings};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn input_arg() -> Arg {
    Arg::new("input")
        .long("input")
        .short('i')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Recorded page load (JSON)")
}

fn cli() -> Command {
    Command::new("lantern")
        .version(lantern_simulator::VERSION)
        .about("Simulate a recorded page load under network and CPU throttling")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Replay the page load and print per-node timings")
                .arg(input_arg())
                .arg(
                    Arg::new("preset")
                        .long("preset")
                        .default_value("mobile")
                        .value_parser(["mobile", "desktop", "none"])
                        .help("Base throttling preset"),
                )
                .arg(
                    Arg::new("rtt-ms")
                        .long("rtt-ms")
                        .value_parser(value_parser!(f64))
                        .help("Override round-trip time (ms)"),
                )
                .arg(
                    Arg::new("throughput-kbps")
                        .long("throughput-kbps")
                        .value_parser(value_parser!(f64))
                        .help("Override link throughput (kbps)"),
                )
                .arg(
                    Arg::new("cpu-slowdown")
                        .long("cpu-slowdown")
                        .value_parser(value_parser!(f64))
                        .help("Override CPU slowdown multiplier"),
                )
                .arg(
                    Arg::new("max-connections")
                        .long("max-connections")
                        .value_parser(value_parser!(usize))
                        .help("Override connections per origin"),
                )
                .arg(
                    Arg::new("variant")
                        .long("variant")
                        .default_value("strict")
                        .value_parser(["strict", "relaxed"])
                        .help("Graph variant to simulate"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("graph")
                .about("Build the dependency graph and print a summary")
                .arg(input_arg()),
        )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("simulate", args)) => run_simulate(args),
        Some(("graph", args)) => run_graph(args),
        Some((other, _)) => bail!("unknown command: {other}"),
        None => bail!("no command given"),
    }
}

fn load_graph(args: &ArgMatches) -> Result<Graph> {
    let path = args
        .get_one::<PathBuf>("input")
        .context("missing --input")?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let page: PageLoad = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let graph = PageGraphBuilder::new()
        .build(&page)
        .context("failed to build dependency graph")?;
    Ok(graph)
}

fn settings_from(args: &ArgMatches) -> ThrottlingSettings {
    let mut settings = match args.get_one::<String>("preset").map(String::as_str) {
        Some("desktop") => ThrottlingSettings::desktop_dense_4g(),
        Some("none") => ThrottlingSettings::unthrottled(),
        _ => ThrottlingSettings::mobile_slow_4g(),
    };
    if let Some(&rtt) = args.get_one::<f64>("rtt-ms") {
        settings.rtt_ms = rtt;
    }
    if let Some(&kbps) = args.get_one::<f64>("throughput-kbps") {
        settings.throughput_kbps = kbps;
    }
    if let Some(&multiplier) = args.get_one::<f64>("cpu-slowdown") {
        settings.cpu_slowdown_multiplier = multiplier;
    }
    if let Some(&limit) = args.get_one::<usize>("max-connections") {
        settings.max_connections_per_origin = limit;
    }
    settings
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeReport {
    id: u32,
    kind: NodeKind,
    label: String,
    #[serde(flatten)]
    timing: lantern_simulator::Timing,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    variant: String,
    end_time_ms: f64,
    critical_path: Vec<u32>,
    nodes: Vec<NodeReport>,
}

fn run_simulate(args: &ArgMatches) -> Result<()> {
    let graph = load_graph(args)?;
    let settings = settings_from(args);
    let variant = args
        .get_one::<String>("variant")
        .cloned()
        .unwrap_or_else(|| "strict".to_string());
    let graph = if variant == "relaxed" {
        graph.clone_with_relaxed_dependencies()
    } else {
        graph.clone_with_strict_dependencies()
    };

    let simulator = Simulator::new(settings).context("invalid throttling settings")?;
    let timing = simulator.simulate(&graph)?;

    let last = timing
        .iter()
        .max_by(|(a, ta), (b, tb)| {
            ta.end_time
                .total_cmp(&tb.end_time)
                .then(b.id().cmp(&a.id()))
        })
        .map(|(node, _)| node.id())
        .unwrap_or(graph.root());

    let report = SimulationReport {
        variant,
        end_time_ms: timing.last_end_time(),
        critical_path: timing.critical_path_to(last).into_iter().map(|id| id.0).collect(),
        nodes: timing
            .iter()
            .map(|(node, t)| NodeReport {
                id: node.id().0,
                kind: node.kind(),
                label: node.label(),
                timing: *t,
            })
            .collect(),
    };

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Variant: {}", report.variant);
    println!("{:>5}  {:>10}  {:>10}  {:>10}  Node", "Id", "Queued", "Start", "End");
    for node in &report.nodes {
        println!(
            "{:>5}  {:>10.1}  {:>10.1}  {:>10.1}  {}",
            node.id,
            node.timing.queued_time,
            node.timing.start_time,
            node.timing.end_time,
            node.label
        );
    }
    println!();
    println!("End time: {:.1}ms", report.end_time_ms);
    println!(
        "Critical path: {}",
        report
            .critical_path
            .iter()
            .map(|id| format!("#{id}"))
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    Ok(())
}

fn run_graph(args: &ArgMatches) -> Result<()> {
    let graph = load_graph(args)?;

    println!("Nodes: {}", graph.len());
    println!("  Network: {}", graph.count_of(NodeKind::Network));
    println!("  CPU: {}", graph.count_of(NodeKind::Cpu));
    println!("Edges: {}", graph.edge_count());
    println!("Root: {} {}", graph.root(), graph.root_node().label());
    println!("Transfer bytes: {}", graph.total_transfer_bytes());
    for node in graph.traverse(lantern_graph::Direction::FromRoot) {
        let dependencies: Vec<String> = node
            .dependencies()
            .iter()
            .map(|dep| format!("{}({:?})", dep.node, dep.kind))
            .collect();
        println!("  {} {} <- [{}]", node.id(), node.label(), dependencies.join(", "));
    }
    Ok(())
}
