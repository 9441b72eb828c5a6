//! Network analysis over observed request records
//!
//! Derives the per-origin latency characteristics the simulator replays:
//! - round-trip time per origin (from observed TCP connect phases)
//! - server response time per origin (time to first byte minus one RTT)
//! - whether each request reused a warm connection

use std::collections::{HashMap, HashSet};

use super::request::NetworkRequestRecord;
use crate::utils::median;

/// Per-origin timing estimates derived from a page load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkAnalysis {
    /// Smallest observed per-origin round trip, in milliseconds
    pub rtt_ms: Option<f64>,
    /// Observed origin RTT above `rtt_ms`, in milliseconds
    pub additional_rtt_by_origin: HashMap<String, f64>,
    /// Median server think time per origin, in milliseconds
    pub server_response_time_by_origin: HashMap<String, f64>,
    /// request id -> whether the request rode an already-open connection
    pub connection_reused: HashMap<String, bool>,
}

impl NetworkAnalysis {
    /// Whether a request reused a connection, per the log or the estimate
    pub fn is_connection_reused(&self, record: &NetworkRequestRecord) -> bool {
        self.connection_reused
            .get(&record.request_id)
            .copied()
            .unwrap_or(record.connection_reused)
    }

    /// Analyze a set of records
    pub fn analyze(records: &[NetworkRequestRecord]) -> Self {
        let rtt_by_origin = estimate_rtt_by_origin(records);
        let rtt_ms = rtt_by_origin.values().copied().reduce(f64::min);
        let additional_rtt_by_origin = rtt_by_origin
            .iter()
            .map(|(origin, rtt)| (origin.clone(), rtt - rtt_ms.unwrap_or(*rtt)))
            .collect();
        let server_response_time_by_origin =
            estimate_server_response_time_by_origin(records, &rtt_by_origin);

        log::debug!(
            "network analysis: {} origin(s), min rtt {:?}ms",
            rtt_by_origin.len(),
            rtt_ms
        );

        Self {
            rtt_ms,
            additional_rtt_by_origin,
            server_response_time_by_origin,
            connection_reused: estimate_connection_reuse(records),
        }
    }
}

/// Estimate the RTT to each origin from connection setup phases
///
/// A fresh TCP connect costs one round trip, so the connect phase of every
/// request that opened a connection is one RTT sample.
pub fn estimate_rtt_by_origin(records: &[NetworkRequestRecord]) -> HashMap<String, f64> {
    let mut samples: HashMap<String, Vec<f64>> = HashMap::new();
    for record in records {
        if record.connection_reused || record.is_connectionless() {
            continue;
        }
        if let Some(connect) = record.timing.as_ref().and_then(|t| t.connect_ms()) {
            samples.entry(record.origin.clone()).or_default().push(connect);
        }
    }
    samples
        .into_iter()
        .filter_map(|(origin, mut values)| median(&mut values).map(|m| (origin, m)))
        .collect()
}

/// Estimate server think time per origin as waiting time minus one RTT
pub fn estimate_server_response_time_by_origin(
    records: &[NetworkRequestRecord],
    rtt_by_origin: &HashMap<String, f64>,
) -> HashMap<String, f64> {
    let mut samples: HashMap<String, Vec<f64>> = HashMap::new();
    for record in records {
        if record.is_connectionless() {
            continue;
        }
        let Some(waiting) = record.timing.as_ref().and_then(|t| t.waiting_ms()) else {
            continue;
        };
        let rtt = rtt_by_origin.get(&record.origin).copied().unwrap_or(0.0);
        samples
            .entry(record.origin.clone())
            .or_default()
            .push((waiting - rtt).max(0.0));
    }
    samples
        .into_iter()
        .filter_map(|(origin, mut values)| median(&mut values).map(|m| (origin, m)))
        .collect()
}

/// Decide for every request whether it rode an already-open connection
///
/// The log's own flag wins when set. Otherwise the first request seen on a
/// connection id opened it and every later one reused it.
pub fn estimate_connection_reuse(records: &[NetworkRequestRecord]) -> HashMap<String, bool> {
    let mut ordered: Vec<&NetworkRequestRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let mut opened: HashSet<(&str, u64)> = HashSet::new();
    let mut reuse = HashMap::with_capacity(records.len());
    for record in ordered {
        let seen = record.connection_id != 0
            && !opened.insert((record.origin.as_str(), record.connection_id));
        reuse.insert(record.request_id.clone(), record.connection_reused || seen);
    }
    reuse
}
