//! Simulation settings
//!
//! Settings are plain serde data so they can be loaded from JSON and folded
//! into the result cache fingerprint through their canonical encoding.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::metrics::Metric;
use crate::simulator::{AssumptionSet, SimulationOptions};
use crate::utils::{LanternError, Result};

/// Network and CPU throttling profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottlingSettings {
    pub rtt_ms: f64,
    pub throughput_kbps: f64,
    pub cpu_slowdown_multiplier: f64,
}

impl ThrottlingSettings {
    /// Slow 4G on a mid-tier phone
    pub fn mobile_slow_4g() -> Self {
        Self {
            rtt_ms: 150.0,
            throughput_kbps: 1638.4,
            cpu_slowdown_multiplier: 4.0,
        }
    }

    pub fn mobile_regular_3g() -> Self {
        Self {
            rtt_ms: 300.0,
            throughput_kbps: 700.0,
            cpu_slowdown_multiplier: 4.0,
        }
    }

    pub fn desktop_dense_4g() -> Self {
        Self {
            rtt_ms: 40.0,
            throughput_kbps: 10_240.0,
            cpu_slowdown_multiplier: 1.0,
        }
    }
}

impl Default for ThrottlingSettings {
    fn default() -> Self {
        Self::mobile_slow_4g()
    }
}

/// Everything that parameterizes one audit run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanternSettings {
    pub throttling: ThrottlingSettings,
    pub max_connections_per_origin: usize,
    /// Network requests in flight at once, across origins
    pub max_concurrent_requests: usize,
    pub layout_task_multiplier: f64,
    pub max_cpu_task_ms: f64,
    pub default_server_response_ms: f64,
    pub use_observed_origin_timings: bool,
    pub metrics: Vec<Metric>,
}

impl Default for LanternSettings {
    fn default() -> Self {
        Self {
            throttling: ThrottlingSettings::default(),
            max_connections_per_origin: 6,
            max_concurrent_requests: 10,
            layout_task_multiplier: 0.5,
            max_cpu_task_ms: 10_000.0,
            default_server_response_ms: 30.0,
            use_observed_origin_timings: true,
            metrics: Metric::ALL.to_vec(),
        }
    }
}

impl LanternSettings {
    /// Parse and validate settings from JSON; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json).map_err(|e| LanternError::InvalidSettings {
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| LanternError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json).map_err(|e| match e {
            LanternError::InvalidSettings { reason } => LanternError::Config {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("rtt_ms", self.throttling.rtt_ms),
            ("throughput_kbps", self.throttling.throughput_kbps),
            ("cpu_slowdown_multiplier", self.throttling.cpu_slowdown_multiplier),
            ("layout_task_multiplier", self.layout_task_multiplier),
            ("max_cpu_task_ms", self.max_cpu_task_ms),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(LanternError::InvalidSettings {
                    reason: format!("{} must be a positive number, got {}", name, value),
                });
            }
        }
        if !(self.default_server_response_ms.is_finite() && self.default_server_response_ms >= 0.0) {
            return Err(LanternError::InvalidSettings {
                reason: "default_server_response_ms must not be negative".to_string(),
            });
        }
        if self.max_connections_per_origin == 0 || self.max_concurrent_requests == 0 {
            return Err(LanternError::InvalidSettings {
                reason: "connection limits must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Simulator options for one assumption set
    pub fn simulation_options(&self, assumptions: &AssumptionSet) -> SimulationOptions {
        SimulationOptions {
            rtt_ms: self.throttling.rtt_ms,
            throughput_kbps: self.throttling.throughput_kbps,
            cpu_slowdown_multiplier: self.throttling.cpu_slowdown_multiplier,
            layout_task_multiplier: self.layout_task_multiplier,
            max_cpu_task_ms: self.max_cpu_task_ms,
            max_concurrent_requests: self.max_concurrent_requests,
            max_connections_per_origin: self.max_connections_per_origin,
            default_server_response_ms: self.default_server_response_ms,
            use_observed_origin_timings: self.use_observed_origin_timings,
            connection_reuse: assumptions.connection_reuse,
        }
    }
}
