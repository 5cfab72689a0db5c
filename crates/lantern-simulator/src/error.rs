//! Error types for simulation setup

/// Invalid input rejected before any simulation work begins
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationConfigError {
    /// RTT must be finite and non-negative
    #[error("invalid rtt: {0}ms")]
    InvalidRtt(f64),

    /// Throughput must be finite and positive
    #[error("invalid throughput: {0}kbps")]
    InvalidThroughput(f64),

    /// The CPU multiplier can only slow the main thread down
    #[error("invalid cpu slowdown multiplier: {0} (must be >= 1)")]
    InvalidCpuSlowdown(f64),

    #[error("invalid connection limit: {0} (must be >= 1)")]
    InvalidConnectionLimit(usize),

    /// Per-origin RTT additions must be finite and non-negative
    #[error("invalid additional rtt for {origin}: {value}ms")]
    InvalidAdditionalRtt { origin: String, value: f64 },

    /// The graph did not traverse completely
    #[error("graph contains a cycle: traversal reached {visited} of {total} nodes")]
    CyclicGraph { visited: usize, total: usize },
}
