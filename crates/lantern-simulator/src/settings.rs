//! Throttling settings
//!
//! Network and CPU constraints a graph is replayed under. Settings are plain
//! data: validate once, then share by reference across any number of runs.

use crate::error::SimulationConfigError;
use lantern_graph::origin_of;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Browsers cap HTTP/1.1 connections per origin at six
pub const DEFAULT_MAX_CONNECTIONS_PER_ORIGIN: usize = 6;

/// Network and CPU throttling for one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThrottlingSettings {
    /// Round-trip time to every origin (ms)
    pub rtt_ms: f64,
    /// Link throughput shared by every active transfer (kilobits/s)
    pub throughput_kbps: f64,
    /// Multiplier applied to every CPU task duration
    pub cpu_slowdown_multiplier: f64,
    /// Ceiling on concurrent requests per origin
    pub max_connections_per_origin: usize,
    /// Extra RTT for specific origins, keyed by `scheme://host[:port]`
    pub additional_rtt_by_origin: BTreeMap<String, f64>,
}

impl ThrottlingSettings {
    /// Slow 4G on a mid-tier phone
    #[must_use]
    pub fn mobile_slow_4g() -> Self {
        Self {
            rtt_ms: 150.0,
            throughput_kbps: 1.6 * 1024.0,
            cpu_slowdown_multiplier: 4.0,
            ..Self::default()
        }
    }

    /// Dense 4G on a desktop
    #[must_use]
    pub fn desktop_dense_4g() -> Self {
        Self {
            rtt_ms: 40.0,
            throughput_kbps: 10.0 * 1024.0,
            cpu_slowdown_multiplier: 1.0,
            ..Self::default()
        }
    }

    /// No added latency, effectively unbounded bandwidth
    #[must_use]
    pub fn unthrottled() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_rtt(mut self, rtt_ms: f64) -> Self {
        self.rtt_ms = rtt_ms;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_throughput(mut self, kbps: f64) -> Self {
        self.throughput_kbps = kbps;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cpu_slowdown(mut self, multiplier: f64) -> Self {
        self.cpu_slowdown_multiplier = multiplier;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_connections_per_origin(mut self, limit: usize) -> Self {
        self.max_connections_per_origin = limit;
        self
    }

    #[must_use]
    pub fn with_additional_rtt(mut self, origin: impl Into<String>, rtt_ms: f64) -> Self {
        self.additional_rtt_by_origin.insert(origin.into(), rtt_ms);
        self
    }

    /// Link throughput in bytes per millisecond
    #[inline]
    #[must_use]
    pub fn throughput_bytes_per_ms(&self) -> f64 {
        // kbps / 8 = kB/s = bytes/ms
        self.throughput_kbps / 8.0
    }

    /// RTT to `origin` including any per-origin addition
    ///
    /// Override keys match by serialized origin, so `https://a.test:443`
    /// applies to `https://a.test`.
    #[must_use]
    pub fn rtt_for_origin(&self, origin: &str) -> f64 {
        let additional = self.additional_rtt_by_origin.get(origin).copied().or_else(|| {
            self.additional_rtt_by_origin
                .iter()
                .find(|(key, _)| origin_of(key) == origin)
                .map(|(_, &rtt)| rtt)
        });
        self.rtt_ms + additional.unwrap_or_default()
    }

    /// Reject parameters that would make timings meaningless
    pub fn validate(&self) -> Result<(), SimulationConfigError> {
        if !self.rtt_ms.is_finite() || self.rtt_ms < 0.0 {
            return Err(SimulationConfigError::InvalidRtt(self.rtt_ms));
        }
        // Infinite throughput is allowed and means "unconstrained"
        if self.throughput_kbps.is_nan() || self.throughput_kbps <= 0.0 {
            return Err(SimulationConfigError::InvalidThroughput(self.throughput_kbps));
        }
        if !self.cpu_slowdown_multiplier.is_finite() || self.cpu_slowdown_multiplier < 1.0 {
            return Err(SimulationConfigError::InvalidCpuSlowdown(
                self.cpu_slowdown_multiplier,
            ));
        }
        if self.max_connections_per_origin == 0 {
            return Err(SimulationConfigError::InvalidConnectionLimit(
                self.max_connections_per_origin,
            ));
        }
        for (origin, &value) in &self.additional_rtt_by_origin {
            if !value.is_finite() || value < 0.0 {
                return Err(SimulationConfigError::InvalidAdditionalRtt {
                    origin: origin.clone(),
                    value,
                });
            }
        }
        Ok(())
    }
}

impl Default for ThrottlingSettings {
    fn default() -> Self {
        Self {
            rtt_ms: 0.0,
            throughput_kbps: f64::INFINITY,
            cpu_slowdown_multiplier: 1.0,
            max_connections_per_origin: DEFAULT_MAX_CONNECTIONS_PER_ORIGIN,
            additional_rtt_by_origin: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for settings in [
            ThrottlingSettings::mobile_slow_4g(),
            ThrottlingSettings::desktop_dense_4g(),
            ThrottlingSettings::unthrottled(),
        ] {
            assert!(settings.validate().is_ok(), "{settings:?}");
        }
        let mobile = ThrottlingSettings::mobile_slow_4g();
        assert!((mobile.throughput_kbps - 1638.4).abs() < 1e-9);
        assert_eq!(mobile.max_connections_per_origin, 6);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = ThrottlingSettings::desktop_dense_4g();

        assert_eq!(
            base.clone().with_rtt(-1.0).validate(),
            Err(SimulationConfigError::InvalidRtt(-1.0))
        );
        assert!(matches!(
            base.clone().with_rtt(f64::NAN).validate(),
            Err(SimulationConfigError::InvalidRtt(_))
        ));
        assert_eq!(
            base.clone().with_throughput(0.0).validate(),
            Err(SimulationConfigError::InvalidThroughput(0.0))
        );
        assert_eq!(
            base.clone().with_cpu_slowdown(0.5).validate(),
            Err(SimulationConfigError::InvalidCpuSlowdown(0.5))
        );
        assert_eq!(
            base.clone().with_max_connections_per_origin(0).validate(),
            Err(SimulationConfigError::InvalidConnectionLimit(0))
        );
        assert!(matches!(
            base.with_additional_rtt("https://cdn.test", f64::INFINITY).validate(),
            Err(SimulationConfigError::InvalidAdditionalRtt { .. })
        ));
    }

    #[test]
    fn test_rtt_for_origin_adds_override() {
        let settings =
            ThrottlingSettings::desktop_dense_4g().with_additional_rtt("https://cdn.test", 25.0);
        assert!((settings.rtt_for_origin("https://cdn.test") - 65.0).abs() < f64::EPSILON);
        assert!((settings.rtt_for_origin("https://a.test") - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rtt_override_with_default_port_key() {
        let settings =
            ThrottlingSettings::unthrottled().with_additional_rtt("https://cdn.test:443", 30.0);
        assert!((settings.rtt_for_origin("https://cdn.test") - 30.0).abs() < f64::EPSILON);
        assert!(settings.rtt_for_origin("https://cdn.test:8443").abs() < f64::EPSILON);
    }

    #[test]
    fn test_deserialize_camel_case_with_defaults() {
        let raw = r#"{"rttMs": 150, "throughputKbps": 1638.4, "cpuSlowdownMultiplier": 4}"#;
        let settings: ThrottlingSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.max_connections_per_origin, 6);
        assert!(settings.additional_rtt_by_origin.is_empty());
        assert!(settings.validate().is_ok());
    }
}
