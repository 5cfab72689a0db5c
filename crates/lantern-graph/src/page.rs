//! Page graph construction
//!
//! Turns a recorded [`PageLoad`] into a [`Graph`] by inferring dependencies
//! from redirects, request initiators, and the overlap between requests and
//! main-thread tasks.

use crate::builder::GraphBuilder;
use crate::error::GraphConstructionError;
use crate::graph::Graph;
use crate::node::{origin_of, CpuNode, DependencyKind, NetworkNode, NodeId};
use crate::record::{NetworkRequest, PageLoad, ResourceType, TaskKind, TraceTask};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Tasks shorter than this cannot move a millisecond-granularity schedule
pub const DEFAULT_MINIMUM_TASK_DURATION_MS: f64 = 1.0;

/// Graph construction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphBuilderConfig {
    /// Top-level tasks below this duration are discarded
    pub minimum_task_duration_ms: f64,
}

impl GraphBuilderConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a different noise threshold
    #[inline]
    #[must_use]
    pub fn with_minimum_task_duration(mut self, ms: f64) -> Self {
        self.minimum_task_duration_ms = ms;
        self
    }
}

impl Default for GraphBuilderConfig {
    fn default() -> Self {
        Self {
            minimum_task_duration_ms: DEFAULT_MINIMUM_TASK_DURATION_MS,
        }
    }
}

/// Builds one rooted graph per recorded page load
#[derive(Debug, Clone, Default)]
pub struct PageGraphBuilder {
    config: GraphBuilderConfig,
}

/// Request placed in the graph, with the record it came from
struct PlacedRequest<'a> {
    id: NodeId,
    record: &'a NetworkRequest,
}

/// Task placed in the graph, with the record it came from
struct PlacedTask<'a> {
    id: NodeId,
    record: &'a TraceTask,
}

impl PageGraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: GraphBuilderConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &GraphBuilderConfig {
        &self.config
    }

    /// Build the dependency graph of a recorded page load
    ///
    /// # Workflow
    /// 1. One network node per request, redirect hops chained in order
    /// 2. One CPU node per significant top-level task
    /// 3. Requests linked to the task or request that discovered them
    /// 4. Evaluation tasks linked to the download they consume
    /// 5. Timer and render-blocking edges between tasks
    /// 6. Structural validation (cycles, single root)
    pub fn build(&self, page: &PageLoad) -> Result<Graph, GraphConstructionError> {
        let mut builder =
            GraphBuilder::with_capacity(page.requests.len() + page.tasks.len());

        let requests = self.place_requests(&mut builder, &page.requests)?;
        let tasks = self.place_tasks(&mut builder, &page.tasks);
        tracing::debug!(
            "Placed {} requests and {} of {} tasks",
            requests.len(),
            tasks.len(),
            page.tasks.len()
        );

        let by_request_id: HashMap<&str, usize> = requests
            .iter()
            .enumerate()
            .map(|(index, placed)| (placed.record.request_id.as_str(), index))
            .collect();

        let root = main_document(&requests);

        link_redirects(&mut builder, &requests, &by_request_id)?;
        link_initiators(&mut builder, &requests, &tasks, &by_request_id, root)?;
        link_evaluations(&mut builder, &requests, &tasks, root)?;
        link_timers(&mut builder, &tasks)?;
        link_render_blocking(&mut builder, &tasks)?;

        builder.build()
    }

    fn place_requests<'a>(
        &self,
        builder: &mut GraphBuilder,
        records: &'a [NetworkRequest],
    ) -> Result<Vec<PlacedRequest<'a>>, GraphConstructionError> {
        let mut order: Vec<usize> = (0..records.len()).collect();
        order.sort_by(|&a, &b| {
            records[a]
                .start_time_ms
                .total_cmp(&records[b].start_time_ms)
                .then(a.cmp(&b))
        });

        let mut seen: HashMap<&str, &NetworkRequest> = HashMap::with_capacity(records.len());
        for record in records {
            if seen.insert(record.request_id.as_str(), record).is_some() {
                return Err(GraphConstructionError::DuplicateRequestId(
                    record.request_id.clone(),
                ));
            }
        }

        let mut placed = Vec::with_capacity(records.len());
        for index in order {
            let record = &records[index];
            let node = NetworkNode {
                request_id: record.request_id.clone(),
                url: record.url.clone(),
                origin: origin_of(record.origin.as_deref().unwrap_or(&record.url)),
                resource_type: record.resource_type,
                transfer_size: record.transfer_size,
                protocol: record.protocol,
                is_connection_reusable: record.is_connection_reusable,
                server_response_time_ms: record.server_response_time_ms.max(0.0),
                redirect_position: redirect_position(record, &seen),
                start_time_ms: record.start_time_ms,
                end_time_ms: record.end_time_ms,
            };
            let id = builder.add_network_node(node);
            placed.push(PlacedRequest { id, record });
        }
        Ok(placed)
    }

    fn place_tasks<'a>(
        &self,
        builder: &mut GraphBuilder,
        records: &'a [TraceTask],
    ) -> Vec<PlacedTask<'a>> {
        let threshold = self.config.minimum_task_duration_ms;
        let mut order: Vec<usize> = (0..records.len())
            .filter(|&index| {
                let duration = records[index].duration_ms;
                duration.is_finite() && duration >= threshold
            })
            .collect();
        let discarded = records.len() - order.len();
        if discarded > 0 {
            tracing::trace!("Discarded {} tasks below {}ms", discarded, threshold);
        }
        order.sort_by(|&a, &b| {
            records[a]
                .start_time_ms
                .total_cmp(&records[b].start_time_ms)
                .then(a.cmp(&b))
        });

        order
            .into_iter()
            .map(|index| {
                let record = &records[index];
                let mut cpu = CpuNode::new(record.duration_ms)
                    .with_task_kind(record.kind)
                    .with_start_time(record.start_time_ms);
                cpu.attributed_url.clone_from(&record.attributed_url);
                PlacedTask {
                    id: builder.add_cpu_node(cpu),
                    record,
                }
            })
            .collect()
    }
}

/// Position of `record` in its redirect chain, 0 when it is not a target
fn redirect_position(record: &NetworkRequest, by_id: &HashMap<&str, &NetworkRequest>) -> u32 {
    let mut position = 0;
    let mut current = record;
    // Bounded walk: a redirect loop is reported as a cycle later
    while let Some(source) = current.redirect_source.as_deref() {
        match by_id.get(source) {
            Some(previous) if (position as usize) < by_id.len() => {
                position += 1;
                current = previous;
            }
            _ => break,
        }
    }
    position
}

/// First non-redirect document request, else the earliest request
fn main_document(requests: &[PlacedRequest<'_>]) -> Option<NodeId> {
    requests
        .iter()
        .find(|r| {
            r.record.resource_type == ResourceType::Document && r.record.redirect_source.is_none()
        })
        .or_else(|| requests.first())
        .map(|r| r.id)
}

fn link_redirects(
    builder: &mut GraphBuilder,
    requests: &[PlacedRequest<'_>],
    by_request_id: &HashMap<&str, usize>,
) -> Result<(), GraphConstructionError> {
    for placed in requests {
        let Some(source) = placed.record.redirect_source.as_deref() else {
            continue;
        };
        let previous = by_request_id.get(source).ok_or_else(|| {
            GraphConstructionError::UnknownRedirectSource {
                request_id: placed.record.request_id.clone(),
                redirect_source: source.to_string(),
            }
        })?;
        builder.add_dependency(placed.id, requests[*previous].id, DependencyKind::Redirect)?;
    }
    Ok(())
}

fn link_initiators(
    builder: &mut GraphBuilder,
    requests: &[PlacedRequest<'_>],
    tasks: &[PlacedTask<'_>],
    by_request_id: &HashMap<&str, usize>,
    root: Option<NodeId>,
) -> Result<(), GraphConstructionError> {
    let mut initiated_by: HashMap<&str, NodeId> = HashMap::new();
    for task in tasks {
        for request_id in &task.record.initiated_requests {
            initiated_by.entry(request_id.as_str()).or_insert(task.id);
        }
    }

    for placed in requests {
        let record = placed.record;
        // Redirect hops are gated by the previous hop alone
        if record.redirect_source.is_some() || Some(placed.id) == root {
            continue;
        }

        let explicit_request = record
            .initiator_request_id
            .as_deref()
            .and_then(|id| {
                let found = by_request_id.get(id);
                if found.is_none() {
                    tracing::warn!(
                        "Request {} names unknown initiator {}",
                        record.request_id,
                        id
                    );
                }
                found
            })
            .map(|&index| requests[index].id)
            .filter(|&id| id != placed.id);

        let (dependency, kind) = if let Some(id) = explicit_request {
            (Some(id), DependencyKind::Initiator)
        } else if let Some(&task) = initiated_by.get(record.request_id.as_str()) {
            (Some(task), DependencyKind::ScriptInitiated)
        } else if let Some(url) = record.initiator_url.as_deref() {
            match running_task(tasks, url, record.start_time_ms) {
                Some(task) => (Some(task), DependencyKind::ScriptInitiated),
                None => (
                    latest_request_before(requests, url, record.start_time_ms, placed.id),
                    DependencyKind::Initiator,
                ),
            }
        } else {
            (None, DependencyKind::Initiator)
        };

        // Parser-discovered requests hang off the main document
        match dependency.or(root) {
            Some(dependency) if dependency != placed.id => {
                builder.add_dependency(placed.id, dependency, kind)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Latest task attributed to `url` that was executing at `time_ms`
fn running_task(tasks: &[PlacedTask<'_>], url: &str, time_ms: f64) -> Option<NodeId> {
    tasks
        .iter()
        .rev()
        .find(|t| t.record.attributed_url.as_deref() == Some(url) && t.record.contains(time_ms))
        .map(|t| t.id)
}

/// Latest request for `url` that started at or before `time_ms`
fn latest_request_before(
    requests: &[PlacedRequest<'_>],
    url: &str,
    time_ms: f64,
    exclude: NodeId,
) -> Option<NodeId> {
    requests
        .iter()
        .rev()
        .find(|r| r.id != exclude && r.record.url == url && r.record.start_time_ms <= time_ms)
        .map(|r| r.id)
}

fn link_evaluations(
    builder: &mut GraphBuilder,
    requests: &[PlacedRequest<'_>],
    tasks: &[PlacedTask<'_>],
    root: Option<NodeId>,
) -> Result<(), GraphConstructionError> {
    for task in tasks {
        let record = task.record;
        let consumed = record
            .attributed_url
            .as_deref()
            .filter(|_| record.kind.consumes_resource())
            .and_then(|url| {
                requests
                    .iter()
                    .filter(|r| r.record.url == url && r.record.end_time_ms <= record.start_time_ms)
                    .max_by(|a, b| a.record.end_time_ms.total_cmp(&b.record.end_time_ms))
            });

        match (consumed, root) {
            (Some(request), _) => {
                builder.add_dependency(task.id, request.id, DependencyKind::Evaluation)?;
            }
            // Tasks with nothing to wait on still run inside the loaded document
            (None, Some(root)) if !record.kind.is_render() => {
                builder.add_dependency(task.id, root, DependencyKind::Initiator)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn link_timers(
    builder: &mut GraphBuilder,
    tasks: &[PlacedTask<'_>],
) -> Result<(), GraphConstructionError> {
    let mut installers: BTreeMap<u64, NodeId> = BTreeMap::new();
    for task in tasks {
        for &timer in &task.record.timers_installed {
            installers.entry(timer).or_insert(task.id);
        }
    }
    for task in tasks {
        for timer in &task.record.timers_fired {
            match installers.get(timer) {
                Some(&installer) if installer != task.id => {
                    builder.add_dependency(task.id, installer, DependencyKind::Timer)?;
                }
                Some(_) => {}
                None => tracing::warn!(
                    "Timer {} fired by task {} has no recorded installer",
                    timer,
                    task.id
                ),
            }
        }
    }
    Ok(())
}

fn link_render_blocking(
    builder: &mut GraphBuilder,
    tasks: &[PlacedTask<'_>],
) -> Result<(), GraphConstructionError> {
    for task in tasks.iter().filter(|t| t.record.kind.is_render()) {
        let blocker = tasks
            .iter()
            .filter(|t| {
                t.record.kind == TaskKind::ScriptEvaluation
                    && t.record.end_time_ms() <= task.record.start_time_ms
            })
            .max_by(|a, b| a.record.end_time_ms().total_cmp(&b.record.end_time_ms()));
        if let Some(blocker) = blocker {
            builder.add_dependency(task.id, blocker.id, DependencyKind::RenderBlocking)?;
        }
    }
    Ok(())
}
