//! Metric strategies
//!
//! A strategy is data, not code: the estimator reads it to decide which
//! nodes to simulate and how to turn the two simulations into one number.
//! New metrics are added by registering another strategy.

use std::collections::BTreeMap;

use super::Metric;
use crate::trace::PaintMarkers;

/// Trace marker a metric is anchored on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    FirstPaint,
    FirstContentfulPaint,
    LargestContentfulPaint,
}

impl Anchor {
    /// Trace event that produces the marker
    pub fn event_name(&self) -> &'static str {
        match self {
            Anchor::FirstPaint => "firstPaint",
            Anchor::FirstContentfulPaint => "firstContentfulPaint",
            Anchor::LargestContentfulPaint => "largestContentfulPaint::Candidate",
        }
    }

    /// Marker timestamp in trace microseconds
    pub fn locate(&self, markers: &PaintMarkers) -> Option<f64> {
        match self {
            Anchor::FirstPaint => markers.first_paint_us,
            Anchor::FirstContentfulPaint => markers.first_contentful_paint_us,
            Anchor::LargestContentfulPaint => markers.largest_contentful_paint_us,
        }
    }
}

/// How the full graph is cut down before simulating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Render-blocking work that finished before the anchor
    PaintCutoff,
    /// Long tasks and the requests likely to feed them
    Interactive,
}

/// How a metric value is read off one simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateRule {
    /// Latest end of any simulated node
    LastNodeEnd { ignore_low_priority_images: bool },
    /// End of the last CPU task longer than the long-task threshold
    LastLongTaskEnd,
    /// Blocking time of tasks between FCP and TTI
    BlockingTime,
    /// Longest CPU task ending after FCP
    LongestTaskAfterFcp,
}

/// Linear combination of the two bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub intercept: f64,
    pub optimistic: f64,
    pub pessimistic: f64,
}

impl Coefficients {
    pub fn combine(&self, optimistic: f64, pessimistic: f64) -> f64 {
        self.intercept + self.optimistic * optimistic + self.pessimistic * pessimistic
    }
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            intercept: 0.0,
            optimistic: 0.5,
            pessimistic: 0.5,
        }
    }
}

/// Everything the estimator needs to know about one metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricStrategy {
    pub metric: Metric,
    pub anchor: Option<Anchor>,
    pub selection: Selection,
    pub rule: EstimateRule,
    pub coefficients: Coefficients,
    /// Metrics whose estimates this one reads
    pub requires: &'static [Metric],
    /// Each bound is floored by the same bound of this metric
    pub estimate_floor: Option<Metric>,
    /// The combined timing is floored by this metric's timing
    pub timing_floor: Option<Metric>,
    /// Lower bound applied to each bound, milliseconds
    pub minimum_ms: f64,
}

impl MetricStrategy {
    fn new(metric: Metric, selection: Selection, rule: EstimateRule) -> Self {
        Self {
            metric,
            anchor: None,
            selection,
            rule,
            coefficients: Coefficients::default(),
            requires: &[],
            estimate_floor: None,
            timing_floor: None,
            minimum_ms: 0.0,
        }
    }

    fn anchored(mut self, anchor: Anchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    fn requiring(mut self, requires: &'static [Metric]) -> Self {
        self.requires = requires;
        self
    }
}

/// Strategies by metric
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    strategies: BTreeMap<Metric, MetricStrategy>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in paint and interactivity metrics
    pub fn standard() -> Self {
        let mut registry = Self::new();

        let last_end = EstimateRule::LastNodeEnd {
            ignore_low_priority_images: false,
        };
        registry.register(
            MetricStrategy::new(Metric::FirstPaint, Selection::PaintCutoff, last_end).anchored(Anchor::FirstPaint),
        );
        registry.register(
            MetricStrategy::new(Metric::FirstContentfulPaint, Selection::PaintCutoff, last_end)
                .anchored(Anchor::FirstContentfulPaint),
        );

        let mut lcp = MetricStrategy::new(
            Metric::LargestContentfulPaint,
            Selection::PaintCutoff,
            EstimateRule::LastNodeEnd {
                ignore_low_priority_images: true,
            },
        )
        .anchored(Anchor::LargestContentfulPaint)
        .requiring(&[Metric::FirstContentfulPaint]);
        lcp.timing_floor = Some(Metric::FirstContentfulPaint);
        registry.register(lcp);

        let mut tti = MetricStrategy::new(Metric::Interactive, Selection::Interactive, EstimateRule::LastLongTaskEnd)
            .requiring(&[Metric::FirstContentfulPaint]);
        tti.estimate_floor = Some(Metric::FirstContentfulPaint);
        registry.register(tti);

        registry.register(
            MetricStrategy::new(Metric::TotalBlockingTime, Selection::Interactive, EstimateRule::BlockingTime)
                .requiring(&[Metric::FirstContentfulPaint, Metric::Interactive]),
        );

        let mut max_fid = MetricStrategy::new(
            Metric::MaxPotentialFid,
            Selection::Interactive,
            EstimateRule::LongestTaskAfterFcp,
        )
        .requiring(&[Metric::FirstContentfulPaint]);
        max_fid.minimum_ms = 16.0;
        registry.register(max_fid);

        registry
    }

    /// Add or replace a strategy
    pub fn register(&mut self, strategy: MetricStrategy) {
        self.strategies.insert(strategy.metric, strategy);
    }

    pub fn get(&self, metric: Metric) -> Option<&MetricStrategy> {
        self.strategies.get(&metric)
    }

    pub fn metrics(&self) -> impl Iterator<Item = Metric> + '_ {
        self.strategies.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_all_metrics() {
        let registry = MetricRegistry::standard();
        for metric in Metric::ALL {
            let strategy = registry.get(metric).unwrap();
            assert_eq!(strategy.metric, metric);
            for required in strategy.requires {
                assert!(registry.get(*required).is_some());
                assert_ne!(*required, metric);
            }
        }
    }

    #[test]
    fn test_coefficients_average_by_default() {
        assert_eq!(Coefficients::default().combine(100.0, 300.0), 200.0);
    }

    #[test]
    fn test_anchor_locates_marker() {
        let markers = PaintMarkers {
            first_paint_us: Some(5.0),
            first_contentful_paint_us: None,
            largest_contentful_paint_us: Some(9.0),
        };
        assert_eq!(Anchor::FirstPaint.locate(&markers), Some(5.0));
        assert_eq!(Anchor::FirstContentfulPaint.locate(&markers), None);
        assert_eq!(Anchor::LargestContentfulPaint.locate(&markers), Some(9.0));
    }
}
