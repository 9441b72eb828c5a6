//! Per-origin pool of simulated connections
//!
//! HTTP/1.x origins get a fixed number of exclusive connections; multiplexed
//! origins (h2, h3) share a single connection across all their streams.
//! Which idle connection a request lands on, and whether it pays a fresh
//! handshake, is decided by a [`ConnectionReuse`] policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::analyzer::NetworkAnalysis;
use super::connection::TcpConnection;
use super::request::NetworkRequestRecord;

/// How optimistic the simulation is about connection warmth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionReuse {
    /// Skip the handshake whenever the log or the simulation says the socket is warm
    Maximal,
    /// Skip the handshake only for requests the log recorded as reused
    #[default]
    AsObserved,
    /// Every request pays for a fresh connection
    Minimal,
}

/// Index of a connection inside the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub usize);

/// Network characteristics the pool sizes its connections with
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub rtt_ms: f64,
    /// Total bandwidth in bits per second
    pub throughput_bps: f64,
    pub max_connections_per_origin: usize,
    pub default_server_response_ms: f64,
    /// Replay per-origin latency measured in the log
    pub use_observed_origin_timings: bool,
}

#[derive(Debug, Clone)]
struct PooledConnection {
    connection: TcpConnection,
    /// Requests currently riding this connection
    streams: usize,
    /// Bandwidth allotted to the whole connection, bits per second
    share_bps: f64,
}

/// All simulated connections of a page load, grouped by origin
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    connections: Vec<PooledConnection>,
    by_origin: BTreeMap<String, Vec<ConnectionId>>,
    throughput_bps: f64,
}

impl ConnectionPool {
    /// Create the pool for every origin the records touch over the network
    pub fn new<'r>(
        records: impl IntoIterator<Item = &'r NetworkRequestRecord>,
        analysis: &NetworkAnalysis,
        options: &PoolOptions,
    ) -> Self {
        let mut origins: BTreeMap<&str, (bool, bool)> = BTreeMap::new();
        for record in records.into_iter().filter(|r| !r.is_connectionless()) {
            let entry = origins
                .entry(record.origin.as_str())
                .or_insert((record.is_secure, false));
            entry.1 |= record.protocol.is_multiplexed();
        }

        let mut connections = Vec::new();
        let mut by_origin = BTreeMap::new();
        for (origin, (ssl, multiplexed)) in origins {
            let mut rtt = options.rtt_ms;
            let mut server_latency = options.default_server_response_ms;
            if options.use_observed_origin_timings {
                rtt += analysis.additional_rtt_by_origin.get(origin).copied().unwrap_or(0.0);
                if let Some(observed) = analysis.server_response_time_by_origin.get(origin) {
                    server_latency = *observed;
                }
            }

            let count = if multiplexed {
                1
            } else {
                options.max_connections_per_origin.max(1)
            };
            let ids: Vec<ConnectionId> = (0..count)
                .map(|_| {
                    connections.push(PooledConnection {
                        connection: TcpConnection::new(rtt, options.throughput_bps, server_latency, ssl, multiplexed),
                        streams: 0,
                        share_bps: options.throughput_bps,
                    });
                    ConnectionId(connections.len() - 1)
                })
                .collect();
            log::trace!("pool: {} connection(s) for {} (h2: {})", ids.len(), origin, multiplexed);
            by_origin.insert(origin.to_string(), ids);
        }

        Self {
            connections,
            by_origin,
            throughput_bps: options.throughput_bps,
        }
    }

    /// Total number of connections across origins
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connections belonging to an origin
    pub fn connections_for_origin(&self, origin: &str) -> &[ConnectionId] {
        self.by_origin.get(origin).map(Vec::as_slice).unwrap_or_default()
    }

    /// Requests currently riding a connection
    pub fn active_streams(&self, id: ConnectionId) -> usize {
        self.connections[id.0].streams
    }

    /// Take a connection for a request, or `None` if the origin has no idle one
    ///
    /// Multiplexed connections accept any number of streams. Under
    /// [`ConnectionReuse::Minimal`] an idle connection is reset before use.
    pub fn acquire(&mut self, record: &NetworkRequestRecord, reused: bool, policy: ConnectionReuse) -> Option<ConnectionId> {
        let idle: Vec<ConnectionId> = self
            .connections_for_origin(&record.origin)
            .iter()
            .copied()
            .filter(|id| self.connections[id.0].connection.is_h2() || self.active_streams(*id) == 0)
            .collect();

        let chosen = match policy {
            ConnectionReuse::Minimal => idle.first().copied(),
            ConnectionReuse::Maximal => self.warmest(&idle, |_| true),
            ConnectionReuse::AsObserved => self
                .warmest(&idle, |c| c.is_warm() == reused)
                .or_else(|| self.warmest(&idle, |_| true)),
        }?;

        let pooled = &mut self.connections[chosen.0];
        if policy == ConnectionReuse::Minimal && pooled.streams == 0 {
            pooled.connection.reset();
        }
        pooled.streams += 1;
        Some(chosen)
    }

    /// Return a request's connection to the pool
    pub fn release(&mut self, id: ConnectionId) {
        let pooled = &mut self.connections[id.0];
        pooled.streams = pooled.streams.saturating_sub(1);
    }

    /// Whether a request on `id` skips the handshake under `policy`
    pub fn is_warm_for(&self, id: ConnectionId, reused: bool, policy: ConnectionReuse) -> bool {
        match policy {
            ConnectionReuse::Maximal => reused || self.connections[id.0].connection.is_warm(),
            ConnectionReuse::AsObserved => reused,
            ConnectionReuse::Minimal => false,
        }
    }

    /// Record that a request finished on `id`, leaving it warm
    pub fn mark_warm(&mut self, id: ConnectionId) {
        self.connections[id.0].connection.set_warmed(true);
    }

    /// Carry the congestion window a download step ended with
    pub fn set_congestion_window(&mut self, id: ConnectionId, congestion_window: f64) {
        self.connections[id.0].connection.set_congestion_window(congestion_window);
    }

    /// Split the total bandwidth across active connections by congestion window
    pub fn update_bandwidth_shares(&mut self) {
        let total_window: f64 = self
            .connections
            .iter()
            .filter(|c| c.streams > 0)
            .map(|c| c.connection.congestion_window())
            .sum();
        for pooled in &mut self.connections {
            pooled.share_bps = if pooled.streams > 0 && total_window > 0.0 {
                self.throughput_bps * pooled.connection.congestion_window() / total_window
            } else {
                self.throughput_bps
            };
        }
    }

    /// The connection as seen by a single stream: its share of the bandwidth
    /// divided evenly among the streams multiplexed on it
    pub fn stream_view(&self, id: ConnectionId) -> TcpConnection {
        let pooled = &self.connections[id.0];
        let mut connection = pooled.connection.clone();
        connection.set_throughput(pooled.share_bps / pooled.streams.max(1) as f64);
        connection
    }

    fn warmest(&self, idle: &[ConnectionId], accept: impl Fn(&TcpConnection) -> bool) -> Option<ConnectionId> {
        idle.iter()
            .copied()
            .filter(|id| accept(&self.connections[id.0].connection))
            .max_by(|a, b| {
                let (a_conn, b_conn) = (&self.connections[a.0].connection, &self.connections[b.0].connection);
                a_conn
                    .is_warm()
                    .cmp(&b_conn.is_warm())
                    .then(a_conn.congestion_window().total_cmp(&b_conn.congestion_window()))
                    // lowest index wins ties
                    .then(b.cmp(a))
            })
    }
}
