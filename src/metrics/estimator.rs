//! Metric estimator
//!
//! Runs a [`MetricStrategy`] against a page model: cut the graph down once
//! per assumption set, simulate both views, cap each optimistic node at
//! its pessimistic end, then read the metric off each simulation and
//! combine the two bounds.

use std::collections::{HashMap, HashSet};

use super::strategy::{EstimateRule, MetricStrategy, Selection};
use super::{Metric, MetricEstimate};
use crate::config::LanternSettings;
use crate::engine::PageModel;
use crate::graph::{DependencyGraph, GraphNode, GraphView, NetworkNode, NodeId};
use crate::network::{Priority, ResourceType};
use crate::simulator::{AssumptionSet, Estimate, NodeTiming, SimulationResult, Simulator};
use crate::utils::{LanternError, Result};

/// Tasks at least this long block input, milliseconds
pub const LONG_TASK_MS: f64 = 50.0;

/// Shortest CPU task kept in the optimistic interactive view, microseconds
pub const INTERACTIVE_CPU_TASK_US: f64 = 20_000.0;

/// Shortest possible input delay, one frame at 60Hz
pub const MIN_INPUT_DELAY_MS: f64 = 16.0;

/// Estimate one metric
///
/// `dependencies` must hold the estimates of every metric in
/// `strategy.requires`.
pub fn estimate(
    strategy: &MetricStrategy,
    page: &PageModel,
    settings: &LanternSettings,
    dependencies: &[&MetricEstimate],
) -> Result<MetricEstimate> {
    let metric = strategy.metric;
    let cutoff_us = match strategy.anchor {
        Some(anchor) => Some(anchor.locate(&page.trace().markers).ok_or_else(|| {
            LanternError::NodeNotFound {
                metric: metric.as_str().to_string(),
                event: anchor.event_name().to_string(),
            }
        })?),
        None => None,
    };

    let (optimistic_view, mut optimistic_estimate) =
        simulate(strategy, page, settings, cutoff_us, Estimate::Optimistic)?;
    let (pessimistic_view, pessimistic_estimate) =
        simulate(strategy, page, settings, cutoff_us, Estimate::Pessimistic)?;

    // Tasks run in ready order, so a faster network can queue a short task
    // behind a long one. No node ends later than it does pessimistically.
    let clamped = optimistic_estimate.clamp_to(&pessimistic_estimate);
    if !clamped.is_empty() {
        log::debug!(
            "{}: {} optimistic node(s) capped at their pessimistic end",
            metric.as_str(),
            clamped.len()
        );
    }

    let optimistic_ms = read_bound(
        strategy,
        &optimistic_view,
        &optimistic_estimate,
        dependencies,
        Estimate::Optimistic,
    )?;
    let pessimistic_ms = read_bound(
        strategy,
        &pessimistic_view,
        &pessimistic_estimate,
        dependencies,
        Estimate::Pessimistic,
    )?;

    let mut timing = strategy.coefficients.combine(optimistic_ms, pessimistic_ms);
    if let Some(floor) = strategy.timing_floor {
        timing = timing.max(dependency(metric, dependencies, floor)?.timing);
    }

    Ok(MetricEstimate {
        metric,
        timing,
        optimistic_ms,
        pessimistic_ms,
        optimistic_estimate,
        pessimistic_estimate,
    })
}

/// Select and simulate the view of one assumption set
fn simulate<'g>(
    strategy: &MetricStrategy,
    page: &'g PageModel,
    settings: &LanternSettings,
    cutoff_us: Option<f64>,
    estimate: Estimate,
) -> Result<(GraphView<'g>, SimulationResult)> {
    let assumptions = AssumptionSet::for_estimate(estimate);
    let view = select_view(page.graph(), strategy.selection, cutoff_us, &assumptions);
    let result = Simulator::new(settings.simulation_options(&assumptions)).simulate(&view, page.analysis())?;
    Ok((view, result))
}

/// Read the metric off one simulation
fn read_bound(
    strategy: &MetricStrategy,
    view: &GraphView<'_>,
    result: &SimulationResult,
    dependencies: &[&MetricEstimate],
    estimate: Estimate,
) -> Result<f64> {
    let metric = strategy.metric;
    let mut value = match strategy.rule {
        EstimateRule::LastNodeEnd {
            ignore_low_priority_images,
        } => last_node_end(view, result, ignore_low_priority_images),
        EstimateRule::LastLongTaskEnd => last_long_task_end(view, result),
        EstimateRule::BlockingTime => {
            let fcp = dependency(metric, dependencies, Metric::FirstContentfulPaint)?;
            let tti = dependency(metric, dependencies, Metric::Interactive)?;
            blocking_time(view, result, fcp.bound(estimate), tti.bound(estimate))
        }
        EstimateRule::LongestTaskAfterFcp => {
            let fcp = dependency(metric, dependencies, Metric::FirstContentfulPaint)?;
            longest_task_after(view, result, fcp.bound(estimate))
        }
    };
    if let Some(floor) = strategy.estimate_floor {
        value = value.max(dependency(metric, dependencies, floor)?.bound(estimate));
    }
    value = value.max(strategy.minimum_ms);

    log::debug!(
        "{} {}: {:.1}ms over {} of {} node(s)",
        metric.as_str(),
        estimate.as_str(),
        value,
        view.len(),
        view.graph().len()
    );
    Ok(value)
}

fn dependency<'a>(metric: Metric, dependencies: &[&'a MetricEstimate], required: Metric) -> Result<&'a MetricEstimate> {
    dependencies
        .iter()
        .copied()
        .find(|e| e.metric == required)
        .ok_or_else(|| LanternError::NodeNotFound {
            metric: metric.as_str().to_string(),
            event: required.as_str().to_string(),
        })
}

/// Cut the graph down for one assumption set
pub fn select_view<'g>(
    graph: &'g DependencyGraph,
    selection: Selection,
    cutoff_us: Option<f64>,
    assumptions: &AssumptionSet,
) -> GraphView<'g> {
    match selection {
        Selection::PaintCutoff => paint_view(graph, cutoff_us.unwrap_or(f64::INFINITY), assumptions),
        Selection::Interactive => interactive_view(graph, assumptions),
    }
}

fn paint_view<'g>(graph: &'g DependencyGraph, cutoff_us: f64, assumptions: &AssumptionSet) -> GraphView<'g> {
    let strict = assumptions.strict_render_blocking;

    let mut cpu_before: Vec<NodeId> = Vec::new();
    // url -> earliest task that evaluated it
    let mut first_evaluation: HashMap<&str, NodeId> = HashMap::new();
    for (id, node) in graph.nodes() {
        let Some(cpu) = node.as_cpu() else { continue };
        if node.start_us() <= cutoff_us {
            cpu_before.push(id);
        }
        for url in &cpu.task.resource_urls {
            let earliest = first_evaluation.entry(url.as_str()).or_insert(id);
            if node.start_us() < graph.node(*earliest).start_us() {
                *earliest = id;
            }
        }
    }
    cpu_before.sort_by(|a, b| graph.node(*a).start_us().total_cmp(&graph.node(*b).start_us()).then(a.cmp(b)));

    let before: HashSet<NodeId> = cpu_before.iter().copied().collect();
    let mut blocking_cpu: HashSet<NodeId> = HashSet::new();
    let mut evaluated_after_cutoff: HashSet<&str> = HashSet::new();
    for (url, id) in &first_evaluation {
        if before.contains(id) {
            blocking_cpu.insert(*id);
        } else {
            evaluated_after_cutoff.insert(*url);
        }
    }

    let cpu_task = |id: NodeId| graph.node(id).as_cpu().map(|c| &c.task);
    let firsts = [
        cpu_before.iter().find(|id| cpu_task(**id).is_some_and(|t| t.did_layout)),
        cpu_before.iter().find(|id| cpu_task(**id).is_some_and(|t| t.did_paint)),
        cpu_before.iter().find(|id| cpu_task(**id).is_some_and(|t| t.did_parse_html)),
    ];
    blocking_cpu.extend(firsts.into_iter().flatten().copied());
    if strict {
        blocking_cpu.extend(cpu_before.iter().filter(|id| cpu_task(**id).is_some_and(|t| t.did_layout)));
    }

    graph.select(|id, node| match node {
        GraphNode::Network(network) => {
            if network.is_main_document {
                return true;
            }
            if node.start_us() > cutoff_us || node.end_us() > cutoff_us {
                return false;
            }
            if evaluated_after_cutoff.contains(network.record.url.as_str()) {
                return false;
            }
            blocks_render(network, strict)
        }
        GraphNode::Cpu(_) => blocking_cpu.contains(&id),
    })
}

fn blocks_render(network: &NetworkNode, strict: bool) -> bool {
    network.record.has_render_blocking_priority() && (strict || !network.is_initiated_by_script())
}

fn interactive_view<'g>(graph: &'g DependencyGraph, assumptions: &AssumptionSet) -> GraphView<'g> {
    if assumptions.strict_render_blocking {
        return graph.full_view();
    }
    graph.select(|_, node| match node {
        GraphNode::Cpu(cpu) => cpu.task.duration_us() > INTERACTIVE_CPU_TASK_US,
        GraphNode::Network(network) => {
            let record = &network.record;
            record.resource_type != ResourceType::Image
                && (record.resource_type == ResourceType::Script || record.priority >= Priority::High)
        }
    })
}

fn is_low_priority_image(node: &GraphNode) -> bool {
    node.as_network()
        .is_some_and(|n| n.record.resource_type == ResourceType::Image && n.record.priority <= Priority::Low)
}

fn last_node_end(view: &GraphView<'_>, result: &SimulationResult, ignore_low_priority_images: bool) -> f64 {
    result
        .node_timings
        .iter()
        .filter(|(id, _)| !(ignore_low_priority_images && is_low_priority_image(view.node(**id))))
        .map(|(_, timing)| timing.end_time)
        .fold(0.0, f64::max)
}

fn cpu_timings<'r>(
    view: &'r GraphView<'_>,
    result: &'r SimulationResult,
) -> impl Iterator<Item = &'r NodeTiming> + 'r {
    result
        .node_timings
        .iter()
        .filter(|(id, _)| view.node(**id).is_cpu())
        .map(|(_, timing)| timing)
}

fn last_long_task_end(view: &GraphView<'_>, result: &SimulationResult) -> f64 {
    cpu_timings(view, result)
        .filter(|t| t.duration() > LONG_TASK_MS)
        .map(|t| t.end_time)
        .fold(0.0, f64::max)
}

fn blocking_time(view: &GraphView<'_>, result: &SimulationResult, from_ms: f64, until_ms: f64) -> f64 {
    cpu_timings(view, result)
        .map(|t| t.end_time.min(until_ms) - t.start_time.max(from_ms))
        .filter(|clipped| *clipped >= LONG_TASK_MS)
        .map(|clipped| clipped - LONG_TASK_MS)
        .sum()
}

fn longest_task_after(view: &GraphView<'_>, result: &SimulationResult, after_ms: f64) -> f64 {
    cpu_timings(view, result)
        .filter(|t| t.end_time > after_ms)
        .map(|t| t.duration())
        .fold(0.0, f64::max)
        .max(MIN_INPUT_DELAY_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::metrics::MetricRegistry;
    use crate::network::NetworkRequestRecord;
    use crate::trace::{CpuTask, PaintMarkers, ProcessedTrace};

    fn record(id: &str, url: &str, start: f64, end: f64, kind: ResourceType, priority: Priority) -> NetworkRequestRecord {
        let mut record = NetworkRequestRecord::new(id, url, start);
        record.end_time = end;
        record.response_received_time = end;
        record.resource_type = kind;
        record.priority = priority;
        record.transfer_size = 2_000;
        record.finished = true;
        record
    }

    fn task(start_ms: f64, dur_ms: f64) -> CpuTask {
        CpuTask::new("RunTask", start_ms * 1000.0, (start_ms + dur_ms) * 1000.0)
    }

    /// Document, a blocking script it evaluates, then a late image and a long task
    fn page(markers: PaintMarkers) -> PageModel {
        let mut script = record("2", "https://a.test/app.js", 0.2, 0.3, ResourceType::Script, Priority::High);
        script.initiator_request_id = Some("1".to_string());
        let mut image = record("3", "https://a.test/hero.png", 0.9, 1.0, ResourceType::Image, Priority::Low);
        image.initiator_request_id = Some("1".to_string());
        let records = vec![
            record("1", "https://a.test/", 0.0, 0.1, ResourceType::Document, Priority::VeryHigh),
            script,
            image,
        ];

        let mut parse = task(110.0, 20.0);
        parse.did_parse_html = true;
        parse.resource_urls.push("https://a.test/".to_string());
        let mut evaluate = task(310.0, 80.0);
        evaluate.resource_urls.push("https://a.test/app.js".to_string());
        let mut paint = task(400.0, 12.0);
        paint.did_paint = true;
        paint.did_layout = true;
        let late = task(1100.0, 200.0);

        let trace = ProcessedTrace {
            navigation_start_us: 0.0,
            main_pid: 1,
            main_tid: 1,
            tasks: vec![parse, evaluate, paint, late],
            markers,
        };
        PageModel::from_records(records, trace, &GraphBuilder::new()).unwrap()
    }

    fn markers() -> PaintMarkers {
        PaintMarkers {
            first_paint_us: Some(420_000.0),
            first_contentful_paint_us: Some(420_000.0),
            largest_contentful_paint_us: Some(1_050_000.0),
        }
    }

    fn run(page: &PageModel, metric: Metric, dependencies: &[&MetricEstimate]) -> Result<MetricEstimate> {
        let registry = MetricRegistry::standard();
        estimate(registry.get(metric).unwrap(), page, &LanternSettings::default(), dependencies)
    }

    #[test]
    fn test_paint_view_excludes_late_work() {
        let page = page(markers());
        let view = select_view(page.graph(), Selection::PaintCutoff, Some(420_000.0), &AssumptionSet::optimistic());
        let image = page.graph().find_network(|n| n.record.request_id == "3").unwrap();
        let script = page.graph().find_network(|n| n.record.request_id == "2").unwrap();
        assert!(view.contains(script));
        assert!(!view.contains(image));
        assert!(view.node_ids().all(|id| view.node(id).end_us() <= 420_000.0 || id == page.graph().root()));
    }

    #[test]
    fn test_optimistic_views_are_subsets() {
        let page = page(markers());
        for selection in [Selection::PaintCutoff, Selection::Interactive] {
            let optimistic = select_view(page.graph(), selection, Some(420_000.0), &AssumptionSet::optimistic());
            let pessimistic = select_view(page.graph(), selection, Some(420_000.0), &AssumptionSet::pessimistic());
            assert!(optimistic.is_subset_of(&pessimistic));
        }
    }

    #[test]
    fn test_fcp_bounds_and_combination() {
        let page = page(markers());
        let fcp = run(&page, Metric::FirstContentfulPaint, &[]).unwrap();
        assert!(fcp.optimistic_ms > 0.0);
        assert!(fcp.optimistic_ms <= fcp.pessimistic_ms);
        assert_eq!(fcp.timing, 0.5 * fcp.optimistic_ms + 0.5 * fcp.pessimistic_ms);
        assert_eq!(fcp.optimistic_ms, fcp.optimistic_estimate.time_in_ms);
    }

    #[test]
    fn test_lcp_floored_by_fcp() {
        let page = page(markers());
        let fcp = run(&page, Metric::FirstContentfulPaint, &[]).unwrap();
        let lcp = run(&page, Metric::LargestContentfulPaint, &[&fcp]).unwrap();
        assert!(lcp.timing >= fcp.timing);
    }

    #[test]
    fn test_interactivity_metrics() {
        let page = page(markers());
        let fcp = run(&page, Metric::FirstContentfulPaint, &[]).unwrap();
        let tti = run(&page, Metric::Interactive, &[&fcp]).unwrap();
        assert!(tti.optimistic_ms >= fcp.optimistic_ms);
        assert!(tti.pessimistic_ms >= fcp.pessimistic_ms);

        let tbt = run(&page, Metric::TotalBlockingTime, &[&fcp, &tti]).unwrap();
        assert!(tbt.timing >= 0.0);

        let max_fid = run(&page, Metric::MaxPotentialFid, &[&fcp]).unwrap();
        assert!(max_fid.optimistic_ms >= MIN_INPUT_DELAY_MS);
        assert!(max_fid.pessimistic_ms >= MIN_INPUT_DELAY_MS);
    }

    #[test]
    fn test_missing_marker_fails_metric() {
        let page = page(PaintMarkers {
            largest_contentful_paint_us: None,
            ..markers()
        });
        let fcp = run(&page, Metric::FirstContentfulPaint, &[]).unwrap();
        let err = run(&page, Metric::LargestContentfulPaint, &[&fcp]).unwrap_err();
        assert_eq!(
            err,
            LanternError::NodeNotFound {
                metric: "LCP".to_string(),
                event: "largestContentfulPaint::Candidate".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_dependency_is_reported() {
        let page = page(markers());
        let err = run(&page, Metric::TotalBlockingTime, &[]).unwrap_err();
        assert!(matches!(err, LanternError::NodeNotFound { .. }));
    }

    #[test]
    fn test_blocking_time_clips_to_window() {
        let graph = DependencyGraph::new(GraphNode::Cpu(crate::graph::CpuNode { task: task(0.0, 10.0) }));
        let view = graph.full_view();
        let mut result = SimulationResult {
            time_in_ms: 300.0,
            node_timings: Default::default(),
        };
        result.node_timings.insert(
            graph.root(),
            NodeTiming {
                queued_time: 0.0,
                start_time: 0.0,
                end_time: 300.0,
                connection_timing: None,
            },
        );
        // clipped to [100, 250] -> 150ms, 100ms of it blocking
        assert_eq!(blocking_time(&view, &result, 100.0, 250.0), 100.0);
        // clipped to 40ms, under the threshold
        assert_eq!(blocking_time(&view, &result, 100.0, 140.0), 0.0);
    }
}
