//! Trace processing
//!
//! Recovers from a raw trace what the page-load model needs:
//! - the renderer main thread and the navigation start
//! - non-overlapping main-thread CPU task intervals with their child events
//!   attributed (scripts evaluated, requests sent, timers, layout, paint)
//! - the paint markers metrics anchor on

pub mod event;
pub mod task;

use serde::{Deserialize, Serialize};

pub use event::{Phase, Trace, TraceEvent};
pub use task::{CpuTask, TaskGroup, TOP_LEVEL_TASK_NAMES};

use crate::utils::{LanternError, Result};
use task::{flatten_intervals, is_top_level_task, RawInterval};

/// Paint markers, in trace microseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaintMarkers {
    pub first_paint_us: Option<f64>,
    pub first_contentful_paint_us: Option<f64>,
    pub largest_contentful_paint_us: Option<f64>,
}

/// The parts of a trace the page-load model consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTrace {
    pub navigation_start_us: f64,
    pub main_pid: u64,
    pub main_tid: u64,
    /// Main-thread tasks ordered by start, never overlapping
    pub tasks: Vec<CpuTask>,
    pub markers: PaintMarkers,
}

impl ProcessedTrace {
    /// Process a trace
    pub fn new(trace: &Trace) -> Result<Self> {
        let (navigation_start_us, main_pid, main_tid) = find_main_thread(trace)?;

        let mut intervals = Vec::new();
        let mut open: Vec<(String, f64)> = Vec::new();
        let mut children: Vec<&TraceEvent> = Vec::new();
        for event in trace.events.iter().filter(|e| e.is_on(main_pid, main_tid)) {
            let top_level = is_top_level_task(&event.name);
            match (event.phase(), top_level) {
                (Phase::Complete, true) => intervals.push(RawInterval {
                    name: event.name.clone(),
                    start_us: event.ts,
                    end_us: event.ts + event.dur.unwrap_or(0.0),
                }),
                (Phase::Begin, true) => open.push((event.name.clone(), event.ts)),
                (Phase::End, true) => match open.iter().rposition(|(name, _)| name == &event.name) {
                    Some(index) => {
                        let (name, start_us) = open.remove(index);
                        intervals.push(RawInterval {
                            name,
                            start_us,
                            end_us: event.ts,
                        });
                    }
                    None => log::debug!("unmatched end of {} at {}us", event.name, event.ts),
                },
                (Phase::Complete | Phase::Begin | Phase::Instant, false) => children.push(event),
                _ => {}
            }
        }
        if !open.is_empty() {
            log::debug!("{} top-level task(s) never ended", open.len());
        }

        let mut tasks = flatten_intervals(intervals);
        children.sort_by(|a, b| a.ts.total_cmp(&b.ts));
        for child in children {
            let index = tasks.partition_point(|t| t.end_us <= child.ts);
            if let Some(task) = tasks.get_mut(index).filter(|t| t.contains(child.ts)) {
                task.attribute(child);
            }
        }

        let markers = find_paint_markers(trace, navigation_start_us, main_pid);
        log::info!(
            "trace: {} main-thread task(s), fcp {:?}us",
            tasks.len(),
            markers.first_contentful_paint_us
        );

        Ok(Self {
            navigation_start_us,
            main_pid,
            main_tid,
            tasks,
            markers,
        })
    }
}

/// Locate the navigation start and the thread that ran it
///
/// The first main-frame `navigationStart` decides; if none is flagged as
/// main frame, the first `navigationStart` is used with the thread named
/// `CrRendererMain` in its process.
fn find_main_thread(trace: &Trace) -> Result<(f64, u64, u64)> {
    let navigations: Vec<&TraceEvent> = trace
        .events
        .iter()
        .filter(|e| e.name == "navigationStart")
        .collect();

    if let Some(nav) = navigations
        .iter()
        .find(|e| e.data()["isLoadingMainFrame"].as_bool() == Some(true))
    {
        return Ok((nav.ts, nav.pid, nav.tid));
    }

    let nav = navigations
        .first()
        .ok_or_else(|| LanternError::malformed_trace("no navigationStart event"))?;
    trace
        .events
        .iter()
        .find(|e| {
            e.phase() == Phase::Metadata
                && e.name == "thread_name"
                && e.pid == nav.pid
                && e.args["name"].as_str() == Some("CrRendererMain")
        })
        .map(|thread| (nav.ts, thread.pid, thread.tid))
        .ok_or_else(|| LanternError::malformed_trace("no renderer main thread"))
}

fn find_paint_markers(trace: &Trace, navigation_start_us: f64, pid: u64) -> PaintMarkers {
    let mut markers = PaintMarkers::default();
    let relevant = trace
        .events
        .iter()
        .filter(|e| e.pid == pid && e.ts >= navigation_start_us);
    for event in relevant {
        match event.name.as_str() {
            "firstPaint" => {
                markers.first_paint_us.get_or_insert(event.ts);
            }
            "firstContentfulPaint" => {
                markers.first_contentful_paint_us.get_or_insert(event.ts);
            }
            "largestContentfulPaint::Candidate" => {
                markers.largest_contentful_paint_us = Some(event.ts);
            }
            "largestContentfulPaint::Invalidate" => {
                markers.largest_contentful_paint_us = None;
            }
            _ => {}
        }
    }
    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trace(events: serde_json::Value) -> Trace {
        Trace::from_value(events).unwrap()
    }

    fn nav(ts: f64) -> serde_json::Value {
        json!({"name": "navigationStart", "ph": "R", "ts": ts, "pid": 1, "tid": 2,
               "args": {"data": {"isLoadingMainFrame": true}}})
    }

    #[test]
    fn test_missing_navigation_is_malformed() {
        let result = ProcessedTrace::new(&trace(json!([])));
        assert!(matches!(result, Err(LanternError::MalformedTrace { .. })));
    }

    #[test]
    fn test_renderer_thread_fallback() {
        let t = trace(json!([
            {"name": "thread_name", "ph": "M", "pid": 1, "tid": 9, "args": {"name": "CrRendererMain"}},
            {"name": "navigationStart", "ph": "R", "ts": 5, "pid": 1, "tid": 3},
            {"name": "RunTask", "ph": "X", "ts": 10, "dur": 20, "pid": 1, "tid": 9}
        ]));
        let processed = ProcessedTrace::new(&t).unwrap();
        assert_eq!(processed.main_tid, 9);
        assert_eq!(processed.tasks.len(), 1);
    }

    #[test]
    fn test_tasks_and_children() {
        let t = trace(json!([
            nav(0.0),
            {"name": "RunTask", "ph": "X", "ts": 100, "dur": 50, "pid": 1, "tid": 2},
            {"name": "EvaluateScript", "ph": "X", "ts": 110, "dur": 30, "pid": 1, "tid": 2,
             "args": {"data": {"url": "https://a.test/app.js"}}},
            {"name": "RunTask", "ph": "B", "ts": 200, "pid": 1, "tid": 2},
            {"name": "Layout", "ph": "B", "ts": 210, "pid": 1, "tid": 2},
            {"name": "Layout", "ph": "E", "ts": 220, "pid": 1, "tid": 2},
            {"name": "RunTask", "ph": "E", "ts": 240, "pid": 1, "tid": 2},
            {"name": "RunTask", "ph": "X", "ts": 300, "dur": 10, "pid": 1, "tid": 7}
        ]));
        let processed = ProcessedTrace::new(&t).unwrap();
        assert_eq!(processed.tasks.len(), 2);
        assert_eq!(processed.tasks[0].group, TaskGroup::ScriptEvaluation);
        assert_eq!(processed.tasks[0].resource_urls, vec!["https://a.test/app.js".to_string()]);
        assert_eq!(processed.tasks[1].end_us, 240.0);
        assert!(processed.tasks[1].did_layout);
    }

    #[test]
    fn test_paint_markers() {
        let t = trace(json!([
            {"name": "firstPaint", "ph": "R", "ts": 1, "pid": 1, "tid": 2},
            nav(10.0),
            {"name": "firstPaint", "ph": "R", "ts": 20, "pid": 1, "tid": 2},
            {"name": "firstContentfulPaint", "ph": "R", "ts": 30, "pid": 1, "tid": 2},
            {"name": "firstContentfulPaint", "ph": "R", "ts": 35, "pid": 1, "tid": 2},
            {"name": "largestContentfulPaint::Candidate", "ph": "R", "ts": 40, "pid": 1, "tid": 2},
            {"name": "largestContentfulPaint::Candidate", "ph": "R", "ts": 50, "pid": 1, "tid": 2}
        ]));
        let markers = ProcessedTrace::new(&t).unwrap().markers;
        assert_eq!(markers.first_paint_us, Some(20.0));
        assert_eq!(markers.first_contentful_paint_us, Some(30.0));
        assert_eq!(markers.largest_contentful_paint_us, Some(50.0));
    }

    #[test]
    fn test_lcp_invalidate_resets() {
        let t = trace(json!([
            nav(0.0),
            {"name": "largestContentfulPaint::Candidate", "ph": "R", "ts": 40, "pid": 1, "tid": 2},
            {"name": "largestContentfulPaint::Invalidate", "ph": "R", "ts": 45, "pid": 1, "tid": 2}
        ]));
        let markers = ProcessedTrace::new(&t).unwrap().markers;
        assert_eq!(markers.largest_contentful_paint_us, None);
    }
}
