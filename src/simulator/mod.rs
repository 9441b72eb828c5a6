//! Discrete-event page-load simulator
//!
//! Replays a [`GraphView`] on one simulated clock:
//! - network requests queue for a connection in their origin's pool, pay
//!   DNS and handshake unless the connection is warm, and download with
//!   TCP slow start while sharing the total bandwidth with every other
//!   active connection in proportion to congestion window
//! - CPU tasks run one at a time on the main thread, first ready first run
//!
//! Each step advances the clock to the soonest completion, completes every
//! node that finishes at that instant, and releases their dependents. The
//! graph is never mutated; all per-run state lives in the simulation.

pub mod assumptions;

use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde::{Deserialize, Serialize};

pub use assumptions::{AssumptionSet, ConnectionReuse, Estimate};

use crate::graph::{GraphNode, GraphView, NodeId};
use crate::network::priority::{Priority, QueuedRequest};
use crate::network::request::NetworkRequestRecord;
use crate::network::{
    ConnectionId, ConnectionPool, ConnectionTiming, DnsCache, DownloadOptions, NetworkAnalysis, PoolOptions,
    TcpConnection,
};
use crate::trace::CpuTask;
use crate::utils::{LanternError, Result, US_PER_MS};

/// Fixed cost of reading a response from the disk cache
pub const DISK_CACHE_BASE_MS: f64 = 8.0;
pub const DISK_CACHE_MS_PER_MIB: f64 = 20.0;
/// Fixed cost of a response served without the network (memory cache,
/// service worker, `data:` and friends)
pub const LOCAL_RESPONSE_BASE_MS: f64 = 2.0;
pub const LOCAL_RESPONSE_MS_PER_MIB: f64 = 10.0;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Network and CPU characteristics of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOptions {
    pub rtt_ms: f64,
    pub throughput_kbps: f64,
    pub cpu_slowdown_multiplier: f64,
    /// Applied on top of the slowdown for tasks that performed layout
    pub layout_task_multiplier: f64,
    pub max_cpu_task_ms: f64,
    pub max_concurrent_requests: usize,
    pub max_connections_per_origin: usize,
    pub default_server_response_ms: f64,
    pub use_observed_origin_timings: bool,
    pub connection_reuse: ConnectionReuse,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            rtt_ms: 150.0,
            throughput_kbps: 1638.4,
            cpu_slowdown_multiplier: 4.0,
            layout_task_multiplier: 0.5,
            max_cpu_task_ms: 10_000.0,
            max_concurrent_requests: 10,
            max_connections_per_origin: 6,
            default_server_response_ms: 30.0,
            use_observed_origin_timings: true,
            connection_reuse: ConnectionReuse::AsObserved,
        }
    }
}

impl SimulationOptions {
    /// Simulated duration of a CPU task, in milliseconds
    pub fn cpu_task_duration_ms(&self, task: &CpuTask) -> f64 {
        let multiplier = if task.did_layout {
            self.cpu_slowdown_multiplier * self.layout_task_multiplier
        } else {
            self.cpu_slowdown_multiplier
        };
        (task.duration_us() / US_PER_MS * multiplier).min(self.max_cpu_task_ms)
    }

    /// Pool sizing for these options
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            rtt_ms: self.rtt_ms,
            throughput_bps: self.throughput_kbps * 1024.0,
            max_connections_per_origin: self.max_connections_per_origin,
            default_server_response_ms: self.default_server_response_ms,
            use_observed_origin_timings: self.use_observed_origin_timings,
        }
    }
}

/// Time to serve a response that never touches a socket, in milliseconds
pub fn local_response_time_ms(record: &NetworkRequestRecord) -> f64 {
    let size_mib = record.resource_size as f64 / BYTES_PER_MIB;
    if record.from_disk_cache {
        DISK_CACHE_BASE_MS + DISK_CACHE_MS_PER_MIB * size_mib
    } else {
        LOCAL_RESPONSE_BASE_MS + LOCAL_RESPONSE_MS_PER_MIB * size_mib
    }
}

/// Simulated timing of one node, milliseconds since the root started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTiming {
    /// When the last dependency finished
    pub queued_time: f64,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timing: Option<ConnectionTiming>,
}

impl NodeTiming {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Outcome of one simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Completion time of the last node
    pub time_in_ms: f64,
    pub node_timings: BTreeMap<NodeId, NodeTiming>,
}

impl SimulationResult {
    pub fn timing(&self, id: NodeId) -> Option<&NodeTiming> {
        self.node_timings.get(&id)
    }

    /// Cap every node at the end time it reached in `bound`
    ///
    /// A node that finished later than in `bound` takes its timing from
    /// `bound` whole, which keeps every dependency ending before its
    /// dependents start. Returns the nodes that moved.
    pub fn clamp_to(&mut self, bound: &SimulationResult) -> Vec<NodeId> {
        let mut clamped = Vec::new();
        for (id, timing) in self.node_timings.iter_mut() {
            let Some(limit) = bound.node_timings.get(id) else {
                continue;
            };
            if timing.end_time > limit.end_time {
                *timing = limit.clone();
                clamped.push(*id);
            }
        }
        if !clamped.is_empty() {
            self.time_in_ms = self.node_timings.values().map(|t| t.end_time).fold(0.0, f64::max);
        }
        clamped
    }
}

/// Runs simulations with fixed options
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    options: SimulationOptions,
}

impl Simulator {
    pub fn new(options: SimulationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    /// Simulate a view of a graph
    pub fn simulate(&self, view: &GraphView<'_>, analysis: &NetworkAnalysis) -> Result<SimulationResult> {
        Simulation::new(view, analysis, &self.options).run()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Waiting,
    Queued,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Default)]
struct Flight {
    queued_time: f64,
    start_time: f64,
    end_time: f64,
    time_elapsed: f64,
    /// Time a download step ran past the period it was simulated for
    time_elapsed_overshoot: f64,
    bytes_downloaded: f64,
    connection: Option<ConnectionId>,
    warm: bool,
    dns_resolution_time: f64,
    connection_timing: Option<ConnectionTiming>,
    final_congestion_window: Option<f64>,
}

struct Simulation<'a> {
    view: &'a GraphView<'a>,
    analysis: &'a NetworkAnalysis,
    options: &'a SimulationOptions,
    pool: ConnectionPool,
    dns: DnsCache,
    state: Vec<NodeState>,
    flights: Vec<Flight>,
    remaining_dependencies: Vec<usize>,
    network_queue: BinaryHeap<QueuedRequest<NodeId>>,
    cpu_queue: BinaryHeap<QueuedRequest<NodeId>>,
    in_progress: BTreeSet<NodeId>,
    network_in_progress: usize,
    cpu_busy: bool,
    elapsed: f64,
    completed: usize,
    total: usize,
}

impl<'a> Simulation<'a> {
    fn new(view: &'a GraphView<'a>, analysis: &'a NetworkAnalysis, options: &'a SimulationOptions) -> Self {
        let size = view.graph().len();
        let records = view
            .node_ids()
            .filter_map(|id| view.node(id).as_network())
            .map(|n| &n.record);
        let pool = ConnectionPool::new(records, analysis, &options.pool_options());
        log::trace!("simulating {} node(s) over {} connection(s)", view.len(), pool.len());

        let mut remaining_dependencies = vec![0; size];
        let mut total = 0;
        for id in view.node_ids() {
            remaining_dependencies[id.index()] = view.dependencies(id).count();
            total += 1;
        }

        Self {
            view,
            analysis,
            options,
            pool,
            dns: DnsCache::new(options.rtt_ms),
            state: vec![NodeState::Waiting; size],
            flights: vec![Flight::default(); size],
            remaining_dependencies,
            network_queue: BinaryHeap::new(),
            cpu_queue: BinaryHeap::new(),
            in_progress: BTreeSet::new(),
            network_in_progress: 0,
            cpu_busy: false,
            elapsed: 0.0,
            completed: 0,
            total,
        }
    }

    fn run(mut self) -> Result<SimulationResult> {
        let root = self.view.graph().root();
        self.mark_ready(root);

        while self.completed < self.total {
            self.start_queued_nodes();
            if self.in_progress.is_empty() {
                return Err(LanternError::SimulationStalled {
                    pending: self.total - self.completed,
                });
            }

            self.pool.update_bandwidth_shares();
            let in_progress: Vec<NodeId> = self.in_progress.iter().copied().collect();
            let estimates: Vec<(NodeId, f64, Option<TcpConnection>)> = in_progress
                .into_iter()
                .map(|id| {
                    let connection = self.flights[id.index()].connection.map(|c| self.pool.stream_view(c));
                    let remaining = self.estimate_time_remaining(id, connection.as_ref());
                    (id, remaining, connection)
                })
                .collect();

            let step = estimates.iter().map(|(_, t, _)| *t).fold(f64::INFINITY, f64::min);
            if !step.is_finite() {
                return Err(LanternError::SimulationStalled {
                    pending: self.total - self.completed,
                });
            }
            self.elapsed += step;
            log::trace!("t={:.1}ms: advancing {:.1}ms", self.elapsed, step);

            for (id, remaining, connection) in estimates {
                if remaining == step {
                    self.complete(id);
                } else {
                    self.update_progress(id, step, connection.as_ref());
                }
            }
        }

        let node_timings = self
            .view
            .node_ids()
            .map(|id| {
                let flight = &self.flights[id.index()];
                let timing = NodeTiming {
                    queued_time: flight.queued_time,
                    start_time: flight.start_time,
                    end_time: flight.end_time,
                    connection_timing: flight.connection_timing.clone(),
                };
                (id, timing)
            })
            .collect();
        log::debug!("simulated {} node(s) in {:.1}ms", self.total, self.elapsed);

        Ok(SimulationResult {
            time_in_ms: self.elapsed,
            node_timings,
        })
    }

    fn mark_ready(&mut self, id: NodeId) {
        self.state[id.index()] = NodeState::Queued;
        self.flights[id.index()].queued_time = self.elapsed;
        let priority = match self.view.node(id) {
            GraphNode::Network(n) => n.record.priority,
            // one priority for all tasks: the main thread is FIFO
            GraphNode::Cpu(_) => Priority::Medium,
        };
        let entry = QueuedRequest {
            item: id,
            priority,
            ready_time: self.elapsed,
            sequence: id.0 as u64,
        };
        if self.view.node(id).is_cpu() {
            self.cpu_queue.push(entry);
        } else {
            self.network_queue.push(entry);
        }
    }

    fn start_queued_nodes(&mut self) {
        if !self.cpu_busy {
            if let Some(next) = self.cpu_queue.pop() {
                self.cpu_busy = true;
                self.start(next.item);
            }
        }

        let mut deferred = Vec::new();
        while let Some(next) = self.network_queue.pop() {
            if self.network_in_progress >= self.options.max_concurrent_requests {
                deferred.push(next);
                break;
            }
            if self.try_start_network(next.item) {
                self.network_in_progress += 1;
                self.start(next.item);
            } else {
                deferred.push(next);
            }
        }
        self.network_queue.extend(deferred);
    }

    fn try_start_network(&mut self, id: NodeId) -> bool {
        let view = self.view;
        let Some(network) = view.node(id).as_network() else {
            return false;
        };
        let record = &network.record;
        if record.is_connectionless() {
            return true;
        }

        let policy = self.options.connection_reuse;
        let reused = self.analysis.is_connection_reused(record);
        let Some(connection) = self.pool.acquire(record, reused, policy) else {
            return false;
        };
        let warm = self.pool.is_warm_for(connection, reused, policy);
        let dns_resolution_time = if warm {
            0.0
        } else {
            self.dns.time_until_resolution(&record.host, self.elapsed)
        };

        let flight = &mut self.flights[id.index()];
        flight.connection = Some(connection);
        flight.warm = warm;
        flight.dns_resolution_time = dns_resolution_time;
        true
    }

    fn start(&mut self, id: NodeId) {
        self.state[id.index()] = NodeState::InProgress;
        self.flights[id.index()].start_time = self.elapsed;
        self.in_progress.insert(id);
    }

    fn download_options(&self, id: NodeId, maximum_time_to_elapse: f64) -> DownloadOptions {
        let flight = &self.flights[id.index()];
        DownloadOptions {
            time_already_elapsed: flight.time_elapsed,
            maximum_time_to_elapse,
            dns_resolution_time: flight.dns_resolution_time,
            warm: flight.warm,
        }
    }

    fn estimate_time_remaining(&mut self, id: NodeId, connection: Option<&TcpConnection>) -> f64 {
        let view = self.view;
        let time_elapsed = self.flights[id.index()].time_elapsed;
        match (view.node(id), connection) {
            (GraphNode::Cpu(cpu), _) => self.options.cpu_task_duration_ms(&cpu.task) - time_elapsed,
            (GraphNode::Network(network), None) => local_response_time_ms(&network.record) - time_elapsed,
            (GraphNode::Network(network), Some(connection)) => {
                let flight = &self.flights[id.index()];
                let bytes = network.record.transfer_size as f64 - flight.bytes_downloaded;
                let results = connection.simulate_download_until(bytes, self.download_options(id, f64::INFINITY));

                let flight = &mut self.flights[id.index()];
                if flight.connection_timing.is_none() {
                    flight.connection_timing = Some(results.connection_timing.clone());
                }
                flight.final_congestion_window = Some(results.congestion_window);
                results.time_elapsed + flight.time_elapsed_overshoot
            }
        }
    }

    fn update_progress(&mut self, id: NodeId, period: f64, connection: Option<&TcpConnection>) {
        let view = self.view;
        match (view.node(id), connection) {
            (GraphNode::Network(network), Some(connection)) => {
                let flight = &self.flights[id.index()];
                let bytes = network.record.transfer_size as f64 - flight.bytes_downloaded;
                let options = self.download_options(id, period - flight.time_elapsed_overshoot);
                let results = connection.simulate_download_until(bytes, options);

                if let Some(connection_id) = self.flights[id.index()].connection {
                    self.pool.set_congestion_window(connection_id, results.congestion_window);
                }
                let flight = &mut self.flights[id.index()];
                flight.time_elapsed += results.time_elapsed;
                flight.time_elapsed_overshoot += results.time_elapsed - period;
                flight.bytes_downloaded += results.bytes_downloaded;
            }
            _ => self.flights[id.index()].time_elapsed += period,
        }
    }

    fn complete(&mut self, id: NodeId) {
        self.state[id.index()] = NodeState::Complete;
        self.in_progress.remove(&id);
        self.completed += 1;

        let flight = &mut self.flights[id.index()];
        flight.end_time = self.elapsed;
        let connection = flight.connection;
        let congestion_window = flight.final_congestion_window;

        let view = self.view;
        if view.node(id).is_cpu() {
            self.cpu_busy = false;
        } else {
            self.network_in_progress -= 1;
            if let Some(connection) = connection {
                self.pool.mark_warm(connection);
                if let Some(window) = congestion_window {
                    self.pool.set_congestion_window(connection, window);
                }
                self.pool.release(connection);
            }
        }

        for dependent in view.dependents(id) {
            let remaining = &mut self.remaining_dependencies[dependent.index()];
            *remaining -= 1;
            if *remaining == 0 && self.state[dependent.index()] == NodeState::Waiting {
                self.mark_ready(dependent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CpuNode, DependencyGraph, NetworkNode};
    use crate::network::connection::TCP_SEGMENT_SIZE;

    fn options() -> SimulationOptions {
        SimulationOptions {
            rtt_ms: 100.0,
            throughput_kbps: 10_000.0,
            cpu_slowdown_multiplier: 1.0,
            default_server_response_ms: 50.0,
            ..Default::default()
        }
    }

    fn request(id: &str, url: &str, size: u64) -> GraphNode {
        let mut record = NetworkRequestRecord::new(id, url, 0.0);
        record.transfer_size = size;
        GraphNode::Network(NetworkNode {
            record,
            is_main_document: false,
        })
    }

    fn task(dur_ms: f64) -> GraphNode {
        GraphNode::Cpu(CpuNode {
            task: CpuTask::new("RunTask", 0.0, dur_ms * 1000.0),
        })
    }

    #[test]
    fn test_single_request() {
        let graph = DependencyGraph::new(request("1", "http://a.test/", 1000));
        let result = Simulator::new(options())
            .simulate(&graph.full_view(), &NetworkAnalysis::default())
            .unwrap();
        // dns 200 + handshake 150 + server 50 + response 50
        assert_eq!(result.time_in_ms, 450.0);
        let timing = result.timing(graph.root()).unwrap();
        assert_eq!(timing.start_time, 0.0);
        assert_eq!(timing.connection_timing.as_ref().unwrap().dns_resolution_time, Some(200.0));
    }

    #[test]
    fn test_cpu_tasks_are_exclusive() {
        let mut graph = DependencyGraph::new(request("1", "http://a.test/", 1000));
        let root = graph.root();
        let a = graph.add_node(task(30.0));
        let b = graph.add_node(task(20.0));
        graph.add_dependency(a, root);
        graph.add_dependency(b, root);
        let result = Simulator::new(options())
            .simulate(&graph.full_view(), &NetworkAnalysis::default())
            .unwrap();
        let (ta, tb) = (result.timing(a).unwrap(), result.timing(b).unwrap());
        assert_eq!(ta.start_time, 450.0);
        assert_eq!(tb.start_time, ta.end_time);
        assert_eq!(tb.end_time, 500.0);
    }

    #[test]
    fn test_cpu_slowdown_and_layout_multiplier() {
        let opts = SimulationOptions {
            cpu_slowdown_multiplier: 4.0,
            ..options()
        };
        let mut task = CpuTask::new("RunTask", 0.0, 10_000.0);
        assert_eq!(opts.cpu_task_duration_ms(&task), 40.0);
        task.did_layout = true;
        assert_eq!(opts.cpu_task_duration_ms(&task), 20.0);
        let long = CpuTask::new("RunTask", 0.0, 5_000_000_000.0);
        assert_eq!(opts.cpu_task_duration_ms(&long), 10_000.0);
    }

    #[test]
    fn test_same_host_shares_dns() {
        let mut graph = DependencyGraph::new(request("1", "http://a.test/", 1000));
        let root = graph.root();
        let b = graph.add_node(request("2", "http://a.test/b.js", 1000));
        graph.add_dependency(b, root);
        let opts = SimulationOptions {
            connection_reuse: ConnectionReuse::Minimal,
            ..options()
        };
        let result = Simulator::new(opts)
            .simulate(&graph.full_view(), &NetworkAnalysis::default())
            .unwrap();
        // second request pays the handshake again but not the lookup
        assert_eq!(result.timing(b).unwrap().duration(), 250.0);
    }

    #[test]
    fn test_warm_connection_under_maximal_reuse() {
        let mut graph = DependencyGraph::new(request("1", "http://a.test/", 1000));
        let root = graph.root();
        let b = graph.add_node(request("2", "http://a.test/b.js", 1000));
        graph.add_dependency(b, root);
        let opts = SimulationOptions {
            connection_reuse: ConnectionReuse::Maximal,
            ..options()
        };
        let result = Simulator::new(opts)
            .simulate(&graph.full_view(), &NetworkAnalysis::default())
            .unwrap();
        assert_eq!(result.timing(b).unwrap().duration(), 150.0);
    }

    #[test]
    fn test_connection_pool_bound() {
        let mut graph = DependencyGraph::new(request("1", "http://a.test/", 1000));
        let root = graph.root();
        let ids: Vec<NodeId> = (0..8)
            .map(|i| {
                let id = graph.add_node(request(&format!("r{}", i), &format!("http://b.test/{}", i), 50_000));
                graph.add_dependency(id, root);
                id
            })
            .collect();
        let opts = SimulationOptions {
            max_connections_per_origin: 2,
            ..options()
        };
        let result = Simulator::new(opts)
            .simulate(&graph.full_view(), &NetworkAnalysis::default())
            .unwrap();
        let mut edges: Vec<(f64, i32)> = Vec::new();
        for id in &ids {
            let timing = result.timing(*id).unwrap();
            edges.push((timing.start_time, 1));
            edges.push((timing.end_time, -1));
        }
        edges.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let mut active = 0;
        for (_, delta) in edges {
            active += delta;
            assert!(active <= 2);
        }
    }

    #[test]
    fn test_bandwidth_bound_download() {
        // 20 segments: one window with the first byte, one more round trip
        let graph = DependencyGraph::new(request("1", "http://a.test/", 20 * TCP_SEGMENT_SIZE as u64));
        let result = Simulator::new(options())
            .simulate(&graph.full_view(), &NetworkAnalysis::default())
            .unwrap();
        assert_eq!(result.time_in_ms, 550.0);
    }

    #[test]
    fn test_cached_request_is_local() {
        let mut graph = DependencyGraph::new(request("1", "http://a.test/", 1000));
        let root = graph.root();
        let mut cached = NetworkRequestRecord::new("2", "http://a.test/x.css", 0.0);
        cached.from_disk_cache = true;
        cached.resource_size = 1024 * 1024;
        let id = graph.add_node(GraphNode::Network(NetworkNode {
            record: cached,
            is_main_document: false,
        }));
        graph.add_dependency(id, root);
        let result = Simulator::new(options())
            .simulate(&graph.full_view(), &NetworkAnalysis::default())
            .unwrap();
        assert_eq!(result.timing(id).unwrap().duration(), 28.0);
    }

    #[test]
    fn test_clamp_caps_nodes_finished_later_than_bound() {
        // a warm socket makes s1 ready first, so its long task takes the
        // main thread ahead of the short task behind the cached s2
        let mut graph = DependencyGraph::new(request("1", "http://a.test/", 1000));
        let root = graph.root();
        let s1 = graph.add_node(request("2", "http://a.test/s1.js", 1000));
        let long_task = graph.add_node(task(100.0));
        let mut cached = NetworkRequestRecord::new("3", "http://a.test/s2.js", 0.0);
        cached.from_disk_cache = true;
        cached.resource_size = 10 * 1024 * 1024;
        let s2 = graph.add_node(GraphNode::Network(NetworkNode {
            record: cached,
            is_main_document: false,
        }));
        let short_task = graph.add_node(task(30.0));
        graph.add_dependency(s1, root);
        graph.add_dependency(long_task, s1);
        graph.add_dependency(s2, root);
        graph.add_dependency(short_task, s2);

        let simulate = |connection_reuse| {
            Simulator::new(SimulationOptions {
                connection_reuse,
                ..options()
            })
            .simulate(&graph.full_view(), &NetworkAnalysis::default())
            .unwrap()
        };
        let mut optimistic = simulate(ConnectionReuse::Maximal);
        let pessimistic = simulate(ConnectionReuse::Minimal);

        assert_eq!(optimistic.timing(short_task).unwrap().start_time, 700.0);
        assert_eq!(pessimistic.timing(short_task).unwrap().start_time, 658.0);
        assert_eq!(optimistic.time_in_ms, 730.0);

        assert_eq!(optimistic.clamp_to(&pessimistic), vec![short_task]);
        assert_eq!(optimistic.timing(short_task), pessimistic.timing(short_task));
        assert_eq!(optimistic.timing(long_task).unwrap().end_time, 700.0);
        assert_eq!(optimistic.time_in_ms, 700.0);
        for (id, timing) in &optimistic.node_timings {
            assert!(timing.end_time <= pessimistic.timing(*id).unwrap().end_time);
        }
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let mut graph = DependencyGraph::new(request("1", "http://a.test/", 30_000));
        let root = graph.root();
        for i in 0..5 {
            let id = graph.add_node(request(&i.to_string(), &format!("http://c{}.test/", i % 2), 40_000));
            graph.add_dependency(id, root);
        }
        let simulator = Simulator::new(options());
        let first = simulator.simulate(&graph.full_view(), &NetworkAnalysis::default()).unwrap();
        let second = simulator.simulate(&graph.full_view(), &NetworkAnalysis::default()).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
