//! DNS resolution cache
//!
//! The first lookup of a host in a run costs two round trips; later lookups
//! only wait for the in-flight resolution, if any, to land.

use std::collections::BTreeMap;

/// Round trips charged for a cold DNS lookup
pub const DNS_RESOLUTION_RTT_MULTIPLIER: f64 = 2.0;

/// Per-run host resolution cache
#[derive(Debug, Clone, Default)]
pub struct DnsCache {
    resolved_at: BTreeMap<String, f64>,
}

impl DnsCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time until `host` resolves for a lookup issued at `requested_at`
    ///
    /// The first lookup records when the resolution completes; lookups issued
    /// before then wait for the remainder, lookups after it are free.
    pub fn resolve(&mut self, host: &str, requested_at: f64, rtt_ms: f64) -> f64 {
        if let Some(&resolved_at) = self.resolved_at.get(host) {
            return (resolved_at - requested_at).max(0.0);
        }
        let cost = rtt_ms * DNS_RESOLUTION_RTT_MULTIPLIER;
        self.resolved_at.insert(host.to_string(), requested_at + cost);
        tracing::trace!("DNS lookup for {} resolves at {}ms", host, requested_at + cost);
        cost
    }

    /// Whether `host` has been looked up in this run
    #[must_use]
    pub fn contains(&self, host: &str) -> bool {
        self.resolved_at.contains_key(host)
    }
}
