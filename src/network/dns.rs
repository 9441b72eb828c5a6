//! Simulated DNS resolution with caching
//!
//! The first lookup of a host costs a fixed number of round trips; requests
//! to a host whose lookup is already in flight wait only for the remainder.

use std::collections::HashMap;

/// A lookup costs this many round trips
pub const DNS_RESOLUTION_RTT_MULTIPLIER: f64 = 2.0;

/// Simulated DNS cache, keyed by host name
#[derive(Debug, Clone)]
pub struct DnsCache {
    /// host -> simulated time (ms) at which the lookup completes
    resolved_at: HashMap<String, f64>,
    rtt_ms: f64,
}

impl DnsCache {
    /// Create a cache for a network with the given round trip time
    pub fn new(rtt_ms: f64) -> Self {
        Self {
            resolved_at: HashMap::new(),
            rtt_ms,
        }
    }

    /// Time until `host` resolves for a lookup issued at `requested_at`
    ///
    /// The lookup is recorded so later requests to the host share it.
    pub fn time_until_resolution(&mut self, host: &str, requested_at: f64) -> f64 {
        let mut time_until_resolved = self.rtt_ms * DNS_RESOLUTION_RTT_MULTIPLIER;
        if let Some(resolved_at) = self.resolved_at.get(host) {
            time_until_resolved = time_until_resolved.min((resolved_at - requested_at).max(0.0));
        }

        let resolved_at = requested_at + time_until_resolved;
        self.resolved_at
            .entry(host.to_string())
            .and_modify(|t| *t = t.min(resolved_at))
            .or_insert(resolved_at);

        time_until_resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_lookup_costs_two_rtts() {
        let mut dns = DnsCache::new(150.0);
        assert_eq!(dns.time_until_resolution("a.test", 0.0), 300.0);
    }

    #[test]
    fn test_in_flight_lookup_is_shared() {
        let mut dns = DnsCache::new(150.0);
        dns.time_until_resolution("a.test", 0.0);
        assert_eq!(dns.time_until_resolution("a.test", 100.0), 200.0);
        assert_eq!(dns.time_until_resolution("a.test", 400.0), 0.0);
    }

    #[test]
    fn test_hosts_resolve_independently() {
        let mut dns = DnsCache::new(100.0);
        dns.time_until_resolution("a.test", 0.0);
        assert_eq!(dns.time_until_resolution("b.test", 50.0), 200.0);
        assert_eq!(dns.time_until_resolution("a.test", 150.0), 50.0);
    }
}
