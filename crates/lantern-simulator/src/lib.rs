//! Lantern Simulator (lantern-simulator)
//!
//! Replays a page dependency graph under synthetic network and CPU
//! throttling and reports when every node would have run.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lantern_simulator::prelude::*;
//!
//! let simulator = Simulator::new(ThrottlingSettings::mobile_slow_4g())?;
//! let timing = simulator.simulate(&graph)?;
//!
//! let document_end = timing.end_time_of(graph.root());
//! let path = timing.critical_path_to(last_paint);
//!
//! let estimate = simulate_variants(&graph, &ThrottlingSettings::mobile_slow_4g())?;
//! let blended = estimate.blend(&BlendCoefficients::new(0.0, 0.5, 0.5));
//! ```

pub mod connection;
pub mod dns;
pub mod error;
pub mod estimate;
pub mod pool;
pub mod settings;
pub mod simulator;
pub mod timing;

// Re-exports
pub use error::SimulationConfigError;
pub use estimate::{estimate_with, simulate_many, simulate_variants, BlendCoefficients, Estimate};
pub use settings::ThrottlingSettings;
pub use simulator::{simulate, NodeState, Simulator};
pub use timing::{ConnectionTiming, NodeTiming, Timing};

/// Commonly used types
pub mod prelude {
    pub use crate::error::SimulationConfigError;
    pub use crate::estimate::{simulate_variants, BlendCoefficients, Estimate};
    pub use crate::settings::ThrottlingSettings;
    pub use crate::simulator::{simulate, Simulator};
    pub use crate::timing::{ConnectionTiming, NodeTiming, Timing};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
