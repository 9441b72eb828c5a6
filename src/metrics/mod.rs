//! Metric estimation
//!
//! Every metric is a data-described [`MetricStrategy`]: which trace marker
//! anchors it, how the graph is cut down for each assumption set, how a
//! value is read off a simulation, and how the two bounds combine. The
//! estimator driver runs any strategy the same way.

pub mod estimator;
pub mod strategy;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

pub use estimator::estimate;
pub use strategy::{Anchor, Coefficients, EstimateRule, MetricRegistry, MetricStrategy, Selection};

use crate::simulator::{Estimate, SimulationResult};
use crate::utils::LanternError;

/// User-centric timing metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "FP")]
    FirstPaint,
    #[serde(rename = "FCP")]
    FirstContentfulPaint,
    #[serde(rename = "LCP")]
    LargestContentfulPaint,
    #[serde(rename = "TTI")]
    Interactive,
    #[serde(rename = "TBT")]
    TotalBlockingTime,
    #[serde(rename = "MaxFID")]
    MaxPotentialFid,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::FirstPaint,
        Metric::FirstContentfulPaint,
        Metric::LargestContentfulPaint,
        Metric::Interactive,
        Metric::TotalBlockingTime,
        Metric::MaxPotentialFid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::FirstPaint => "FP",
            Metric::FirstContentfulPaint => "FCP",
            Metric::LargestContentfulPaint => "LCP",
            Metric::Interactive => "TTI",
            Metric::TotalBlockingTime => "TBT",
            Metric::MaxPotentialFid => "MaxFID",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str().eq_ignore_ascii_case(name))
    }
}

/// A metric's value with the two simulations that bound it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEstimate {
    pub metric: Metric,
    /// Combined estimate, milliseconds
    pub timing: f64,
    /// Metric value under the optimistic assumptions
    pub optimistic_ms: f64,
    /// Metric value under the pessimistic assumptions
    pub pessimistic_ms: f64,
    pub optimistic_estimate: SimulationResult,
    pub pessimistic_estimate: SimulationResult,
}

impl MetricEstimate {
    /// Metric value under one assumption set
    pub fn bound(&self, estimate: Estimate) -> f64 {
        match estimate {
            Estimate::Optimistic => self.optimistic_ms,
            Estimate::Pessimistic => self.pessimistic_ms,
        }
    }
}

/// Result of one metric inside a report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum MetricOutcome {
    Estimated(MetricEstimate),
    Failed {
        #[serde(serialize_with = "serialize_error")]
        error: LanternError,
    },
}

impl MetricOutcome {
    pub fn estimate(&self) -> Option<&MetricEstimate> {
        match self {
            MetricOutcome::Estimated(estimate) => Some(estimate),
            MetricOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&LanternError> {
        match self {
            MetricOutcome::Failed { error } => Some(error),
            MetricOutcome::Estimated(_) => None,
        }
    }
}

impl From<Result<MetricEstimate, LanternError>> for MetricOutcome {
    fn from(result: Result<MetricEstimate, LanternError>) -> Self {
        match result {
            Ok(estimate) => MetricOutcome::Estimated(estimate),
            Err(error) => MetricOutcome::Failed { error },
        }
    }
}

fn serialize_error<S: Serializer>(error: &LanternError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

/// Estimates of every requested metric for one page load
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LanternReport {
    pub metrics: BTreeMap<Metric, MetricOutcome>,
}

impl LanternReport {
    pub fn get(&self, metric: Metric) -> Option<&MetricOutcome> {
        self.metrics.get(&metric)
    }

    /// Combined timing of a metric, if it was estimated
    pub fn timing(&self, metric: Metric) -> Option<f64> {
        self.get(metric).and_then(MetricOutcome::estimate).map(|e| e.timing)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
