//! Lantern engine orchestrating all components
//!
//! The LanternEngine runs the estimation pipeline:
//! 1. Normalize the network log into request records
//! 2. Process the trace into main-thread tasks and paint markers
//! 3. Build the page dependency graph and analyze the network
//! 4. Estimate each requested metric, dependencies first
//!
//! Failures in steps 1-3 are fatal to the page; a failing metric only
//! fails itself and the metrics that read it.

mod page;

pub use page::PageModel;

use std::collections::BTreeMap;

use crate::config::LanternSettings;
use crate::graph::GraphBuilder;
use crate::metrics::{self, LanternReport, Metric, MetricEstimate, MetricOutcome, MetricRegistry, MetricStrategy};
use crate::network::NetworkLog;
use crate::trace::Trace;
use crate::utils::{LanternError, Result};

/// The main engine coordinating all subsystems
#[derive(Debug)]
pub struct LanternEngine {
    /// Settings applied to every estimate
    settings: LanternSettings,
    /// Strategies for the metrics this engine knows
    registry: MetricRegistry,
    /// Graph builder, shared across pages
    builder: GraphBuilder,
}

impl LanternEngine {
    /// Create an engine with the standard metrics
    pub fn new(settings: LanternSettings) -> Self {
        Self::with_registry(settings, MetricRegistry::standard())
    }

    /// Create an engine with a custom set of strategies
    pub fn with_registry(settings: LanternSettings, registry: MetricRegistry) -> Self {
        Self {
            settings,
            registry,
            builder: GraphBuilder::new(),
        }
    }

    pub fn settings(&self) -> &LanternSettings {
        &self.settings
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn builder(&self) -> &GraphBuilder {
        &self.builder
    }

    /// Build the page-load model from raw inputs
    pub fn build_page(&self, trace: &Trace, log: &NetworkLog) -> Result<PageModel> {
        PageModel::build(trace, log, &self.builder)
    }

    /// Estimate every configured metric for a page load
    pub fn run(&self, trace: &Trace, log: &NetworkLog) -> Result<LanternReport> {
        let page = self.build_page(trace, log)?;
        Ok(self.report(&page))
    }

    /// Estimate every configured metric for an already built page
    pub fn report(&self, page: &PageModel) -> LanternReport {
        let mut memo = BTreeMap::new();
        let mut report = LanternReport::default();
        for metric in &self.settings.metrics {
            let outcome = self.resolve(page, *metric, &mut memo, &mut Vec::new()).map(Clone::clone);
            match &outcome {
                Err(err) if err.is_fatal_to_page() => log::error!("{} not estimated: {}", metric.as_str(), err),
                Err(err) => log::warn!("{} not estimated: {}", metric.as_str(), err),
                Ok(_) => {}
            }
            report.metrics.insert(*metric, MetricOutcome::from(outcome));
        }
        report
    }

    /// Estimate one metric, computing whatever it depends on
    pub fn estimate_metric(&self, page: &PageModel, metric: Metric) -> Result<MetricEstimate> {
        let mut memo = BTreeMap::new();
        self.resolve(page, metric, &mut memo, &mut Vec::new()).map(Clone::clone)
    }

    /// Strategy registered for `metric`
    pub fn strategy(&self, metric: Metric) -> Result<&MetricStrategy> {
        self.registry.get(metric).ok_or_else(|| LanternError::InvalidSettings {
            reason: format!("no strategy registered for {}", metric.as_str()),
        })
    }

    fn resolve<'m>(
        &self,
        page: &PageModel,
        metric: Metric,
        memo: &'m mut BTreeMap<Metric, Result<MetricEstimate>>,
        resolving: &mut Vec<Metric>,
    ) -> std::result::Result<&'m MetricEstimate, LanternError> {
        if !memo.contains_key(&metric) {
            let outcome = self.compute(page, metric, memo, resolving);
            memo.insert(metric, outcome);
        }
        match memo.get(&metric) {
            Some(Ok(estimate)) => Ok(estimate),
            Some(Err(err)) => Err(err.clone()),
            None => Err(LanternError::InvalidSettings {
                reason: format!("{} was not resolved", metric.as_str()),
            }),
        }
    }

    fn compute(
        &self,
        page: &PageModel,
        metric: Metric,
        memo: &mut BTreeMap<Metric, Result<MetricEstimate>>,
        resolving: &mut Vec<Metric>,
    ) -> Result<MetricEstimate> {
        if resolving.contains(&metric) {
            return Err(LanternError::InvalidSettings {
                reason: format!("{} depends on itself", metric.as_str()),
            });
        }
        let strategy = self.strategy(metric)?;

        resolving.push(metric);
        for required in strategy.requires {
            if let Err(err) = self.resolve(page, *required, memo, resolving) {
                resolving.pop();
                return Err(err);
            }
        }
        resolving.pop();

        let dependencies: Vec<&MetricEstimate> = strategy
            .requires
            .iter()
            .filter_map(|required| memo.get(required).and_then(|r| r.as_ref().ok()))
            .collect();
        metrics::estimate(strategy, page, &self.settings, &dependencies)
    }
}

impl Default for LanternEngine {
    fn default() -> Self {
        Self::new(LanternSettings::default())
    }
}
