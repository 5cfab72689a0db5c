//! Optimistic/pessimistic estimates
//!
//! A metric is simulated twice, once on the relaxed graph variant and once on
//! the strict one, and the two end times are blended with caller-supplied
//! coefficients. The two runs are independent and execute on the rayon pool.

use crate::error::SimulationConfigError;
use crate::settings::ThrottlingSettings;
use crate::simulator::Simulator;
use crate::timing::NodeTiming;
use lantern_graph::Graph;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Linear blend of the two variant estimates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendCoefficients {
    pub intercept: f64,
    pub optimistic: f64,
    pub pessimistic: f64,
}

impl BlendCoefficients {
    #[must_use]
    pub fn new(intercept: f64, optimistic: f64, pessimistic: f64) -> Self {
        Self {
            intercept,
            optimistic,
            pessimistic,
        }
    }

    /// Equal weight to both variants
    #[must_use]
    pub fn midpoint() -> Self {
        Self::new(0.0, 0.5, 0.5)
    }
}

/// End times of the relaxed and strict runs (ms)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub optimistic_ms: f64,
    pub pessimistic_ms: f64,
}

impl Estimate {
    #[must_use]
    pub fn blend(&self, coefficients: &BlendCoefficients) -> f64 {
        coefficients.intercept
            + coefficients.optimistic * self.optimistic_ms
            + coefficients.pessimistic * self.pessimistic_ms
    }
}

/// Simulate both variants of `graph` and read one time from each result
///
/// `select` picks the time a metric cares about, e.g. the end of the last
/// node or of a particular request.
pub fn estimate_with<F>(
    graph: &Graph,
    settings: &ThrottlingSettings,
    select: F,
) -> Result<Estimate, SimulationConfigError>
where
    F: Fn(&NodeTiming<'_>) -> f64 + Sync,
{
    let simulator = Simulator::new(settings.clone())?;
    let optimistic_graph = graph.clone_with_relaxed_dependencies();
    let pessimistic_graph = graph.clone_with_strict_dependencies();

    let (optimistic, pessimistic) = rayon::join(
        || simulator.simulate(&optimistic_graph).map(|t| select(&t)),
        || simulator.simulate(&pessimistic_graph).map(|t| select(&t)),
    );

    Ok(Estimate {
        optimistic_ms: optimistic?,
        pessimistic_ms: pessimistic?,
    })
}

/// Page end time under both variants
pub fn simulate_variants(
    graph: &Graph,
    settings: &ThrottlingSettings,
) -> Result<Estimate, SimulationConfigError> {
    estimate_with(graph, settings, |timing| timing.last_end_time())
}

/// Run one graph under many settings in parallel, results in input order
pub fn simulate_many<'g>(
    graph: &'g Graph,
    settings: &[ThrottlingSettings],
) -> Vec<Result<NodeTiming<'g>, SimulationConfigError>> {
    settings
        .par_iter()
        .map(|s| Simulator::new(s.clone())?.simulate(graph))
        .collect()
}
