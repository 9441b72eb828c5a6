//! Dependency graph construction
//!
//! Edges, most specific first:
//! 1. a redirect hop depends on the hop before it, and on nothing else
//! 2. a request depends on its initiating request, or on the root
//! 3. a task that parses or executes a resource depends on that request
//! 4. a task contained in another depends on the outer task, and the rest
//!    of the outer task depends on the nested one
//!
//! plus: a request depends on the task that sent it, a timer callback
//! depends on the task that installed the timer, and a task with no other
//! dependency depends on the root. Insignificant tasks that touch nothing
//! are pruned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::node::{CpuNode, GraphNode, NetworkNode, NodeId};
use super::DependencyGraph;
use crate::network::request::NetworkRequestRecord;
use crate::trace::{CpuTask, ProcessedTrace};
use crate::utils::{LanternError, Result};

/// Tasks shorter than this are dropped unless something depends on them
pub const SIGNIFICANT_CPU_TASK_US: f64 = 10_000.0;
/// A resource may still be in flight this long after a task that uses it started
pub const URL_MATCH_SLACK_US: f64 = 100_000.0;

/// Builds dependency graphs and counts how many it has built
#[derive(Debug, Default)]
pub struct GraphBuilder {
    builds: AtomicUsize,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of graphs built so far
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Build the graph of one page load
    pub fn build(&self, records: &[NetworkRequestRecord], trace: &ProcessedTrace) -> Result<DependencyGraph> {
        self.builds.fetch_add(1, Ordering::SeqCst);

        let root_index = find_root(records).ok_or(LanternError::MissingRootNode)?;
        let main_document = main_document_index(records, root_index);

        let mut graph = DependencyGraph::new(network_node(records, root_index, main_document));
        let mut by_request_id: HashMap<&str, NodeId> = HashMap::new();
        let mut by_url: HashMap<&str, Vec<NodeId>> = HashMap::new();
        let mut network_ids = Vec::with_capacity(records.len());
        for index in 0..records.len() {
            let id = if index == root_index {
                graph.root()
            } else {
                graph.add_node(network_node(records, index, main_document))
            };
            by_request_id.insert(records[index].request_id.as_str(), id);
            if records[index].is_terminal() {
                by_url.entry(records[index].url.as_str()).or_default().push(id);
            }
            network_ids.push(id);
        }

        link_network_nodes(&mut graph, records, &network_ids, &by_request_id);
        link_cpu_nodes(&mut graph, &trace.tasks, &by_request_id, &by_url);

        let root = graph.root();
        let orphans: Vec<NodeId> = graph
            .node_ids()
            .filter(|id| *id != root && graph.dependencies(*id).is_empty())
            .collect();
        for id in orphans {
            graph.add_dependency(id, root);
        }
        debug_assert!(graph.is_acyclic());
        debug_assert_eq!(graph.sources(), vec![root]);

        log::info!(
            "dependency graph: {} node(s), {} edge(s), {} dropped",
            graph.len(),
            graph.edge_count(),
            graph.dropped_edges()
        );
        Ok(graph)
    }
}

/// The first hop of the first document navigation
fn find_root(records: &[NetworkRequestRecord]) -> Option<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_document() && r.redirect_source.is_none())
        .min_by(|(ia, a), (ib, b)| a.start_time.total_cmp(&b.start_time).then(ia.cmp(ib)))
        .map(|(index, _)| index)
}

/// Follow the root's redirect chain to its terminal hop
fn main_document_index(records: &[NetworkRequestRecord], root: usize) -> usize {
    let mut current = root;
    for _ in 0..records.len() {
        let Some(next_id) = records[current].redirect_destination.as_deref() else {
            break;
        };
        match records.iter().position(|r| r.request_id == next_id) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

fn network_node(records: &[NetworkRequestRecord], index: usize, main_document: usize) -> GraphNode {
    GraphNode::Network(NetworkNode {
        record: records[index].clone(),
        is_main_document: index == main_document,
    })
}

fn link_network_nodes(
    graph: &mut DependencyGraph,
    records: &[NetworkRequestRecord],
    ids: &[NodeId],
    by_request_id: &HashMap<&str, NodeId>,
) {
    let root = graph.root();
    for (record, &id) in records.iter().zip(ids) {
        if id == root {
            continue;
        }

        if let Some(source) = record.redirect_source.as_deref() {
            match by_request_id.get(source) {
                Some(&previous) => {
                    graph.add_dependency(id, previous);
                }
                None => log::warn!("redirect source {} of {} is missing", source, record.request_id),
            }
            continue;
        }

        let initiator = record
            .initiator_request_id
            .as_deref()
            .and_then(|initiator| by_request_id.get(initiator).copied())
            .filter(|initiator| graph.node(*initiator).start_us() <= graph.node(id).start_us());
        let linked = initiator.is_some_and(|initiator| graph.add_dependency(id, initiator));
        if !linked {
            graph.add_dependency(id, root);
        }
    }
}

fn link_cpu_nodes(
    graph: &mut DependencyGraph,
    tasks: &[CpuTask],
    by_request_id: &HashMap<&str, NodeId>,
    by_url: &HashMap<&str, Vec<NodeId>>,
) {
    let timer_installers: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .flat_map(|(index, task)| task.timers_installed.iter().map(move |timer| (timer.as_str(), index)))
        .rev()
        .collect();

    // Resource dependencies and requests sent decide significance.
    let resource_deps: Vec<Vec<NodeId>> = tasks
        .iter()
        .map(|task| {
            task.resource_urls
                .iter()
                .filter_map(|url| closest_request(graph, by_url, url, task.start_us))
                .collect()
        })
        .collect();
    let sent: Vec<Vec<NodeId>> = tasks
        .iter()
        .map(|task| {
            task.sent_request_ids
                .iter()
                .filter_map(|request_id| by_request_id.get(request_id.as_str()).copied())
                .filter(|request| graph.node(*request).start_us() >= task.start_us)
                .collect()
        })
        .collect();

    let first_of = |flag: fn(&CpuTask) -> bool| tasks.iter().position(flag);
    let always_keep = [
        first_of(|t| t.did_layout),
        first_of(|t| t.did_paint),
        first_of(|t| t.did_parse_html),
    ];
    let keep: Vec<bool> = (0..tasks.len())
        .map(|index| {
            tasks[index].duration_us() >= SIGNIFICANT_CPU_TASK_US
                || !resource_deps[index].is_empty()
                || !sent[index].is_empty()
                || always_keep.contains(&Some(index))
        })
        .collect();

    let mut cpu_ids: Vec<Option<NodeId>> = Vec::with_capacity(tasks.len());
    for (task, kept) in tasks.iter().zip(&keep) {
        cpu_ids.push(kept.then(|| graph.add_node(GraphNode::Cpu(CpuNode { task: task.clone() }))));
    }
    log::debug!(
        "pruned {} insignificant task(s)",
        keep.iter().filter(|k| !**k).count()
    );

    for (index, task) in tasks.iter().enumerate() {
        let Some(id) = cpu_ids[index] else {
            continue;
        };
        for &request in &resource_deps[index] {
            graph.add_dependency(id, request);
        }
        // Temporal containment: a task nested inside another was split out of
        // it, and `follows` points at the outer segment it ran within.
        if let Some(previous) = kept_predecessor(tasks, &cpu_ids, task.follows) {
            graph.add_dependency(id, previous);
        }
        for timer in &task.timers_fired {
            let installer = timer_installers
                .get(timer.as_str())
                .filter(|installer| **installer < index)
                .and_then(|installer| cpu_ids[*installer]);
            if let Some(installer) = installer {
                graph.add_dependency(id, installer);
            }
        }
        for &request in &sent[index] {
            graph.add_dependency(request, id);
        }
    }
}

/// The request for `url` that finished closest to `task_start`
///
/// Only requests that started before the task and finished no later than
/// [`URL_MATCH_SLACK_US`] after it started are candidates.
fn closest_request(
    graph: &DependencyGraph,
    by_url: &HashMap<&str, Vec<NodeId>>,
    url: &str,
    task_start: f64,
) -> Option<NodeId> {
    by_url
        .get(url)?
        .iter()
        .copied()
        .filter(|id| {
            let node = graph.node(*id);
            node.start_us() < task_start && node.end_us() <= task_start + URL_MATCH_SLACK_US
        })
        .min_by(|a, b| {
            let distance = |id: &NodeId| (task_start - graph.node(*id).end_us()).abs();
            distance(a).total_cmp(&distance(b)).then(a.cmp(b))
        })
}

/// Walk `follows` links past pruned tasks
fn kept_predecessor(tasks: &[CpuTask], cpu_ids: &[Option<NodeId>], mut follows: Option<usize>) -> Option<NodeId> {
    while let Some(index) = follows {
        if let Some(id) = cpu_ids[index] {
            return Some(id);
        }
        follows = tasks[index].follows;
    }
    None
}
