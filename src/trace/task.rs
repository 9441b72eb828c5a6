//! Main-thread CPU task intervals
//!
//! Top-level tasks are recovered from the run-loop events of the main
//! thread. A top-level task that runs nested inside another (a nested run
//! loop) splits the outer task into segments around it, so the resulting
//! intervals never overlap and the ordering outer -> nested -> outer is kept
//! through [`CpuTask::follows`].

use serde::{Deserialize, Serialize};

use super::event::TraceEvent;

/// Events that mark one turn of the main-thread run loop
pub const TOP_LEVEL_TASK_NAMES: &[&str] = &[
    "RunTask",
    "ThreadControllerImpl::RunTask",
    "ThreadControllerImpl::DoWork",
    "TaskQueueManager::ProcessTaskFromWorkQueue",
];

pub fn is_top_level_task(name: &str) -> bool {
    TOP_LEVEL_TASK_NAMES.contains(&name)
}

/// Coarse classification of what a task spent its time on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TaskGroup {
    ParseHtml,
    ScriptEvaluation,
    StyleLayout,
    PaintComposite,
    GarbageCollection,
    #[default]
    Other,
}

impl TaskGroup {
    /// Group implied by a child event name, if it implies one
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "ParseHTML" => Some(Self::ParseHtml),
            "EvaluateScript" | "FunctionCall" | "v8.compile" | "v8.compileModule" | "TimerFire"
            | "EventDispatch" | "XHRReadyStateChange" => Some(Self::ScriptEvaluation),
            "Layout" | "UpdateLayoutTree" | "RecalculateStyles" | "ParseAuthorStyleSheet" => {
                Some(Self::StyleLayout)
            }
            "Paint" | "CompositeLayers" | "UpdateLayerTree" => Some(Self::PaintComposite),
            "MinorGC" | "MajorGC" | "V8.GCScavenger" | "V8.GCFinalizeMC" => Some(Self::GarbageCollection),
            _ => None,
        }
    }

    /// Tie-break when a task contains events of several groups
    fn rank(self) -> u8 {
        match self {
            Self::ScriptEvaluation => 5,
            Self::ParseHtml => 4,
            Self::StyleLayout => 3,
            Self::PaintComposite => 2,
            Self::GarbageCollection => 1,
            Self::Other => 0,
        }
    }
}

/// One main-thread interval `[start_us, end_us)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuTask {
    pub name: String,
    pub start_us: f64,
    pub end_us: f64,
    pub group: TaskGroup,
    /// Resources this task parsed or executed, in event order
    pub resource_urls: Vec<String>,
    /// Request ids the task issued
    pub sent_request_ids: Vec<String>,
    pub timers_installed: Vec<String>,
    pub timers_fired: Vec<String>,
    pub did_layout: bool,
    pub did_paint: bool,
    pub did_parse_html: bool,
    /// Index of the interval that must finish first because this one was
    /// split out of, or nested inside, the same outer task
    pub follows: Option<usize>,
}

impl CpuTask {
    pub fn new(name: impl Into<String>, start_us: f64, end_us: f64) -> Self {
        Self {
            name: name.into(),
            start_us,
            end_us,
            group: TaskGroup::Other,
            resource_urls: Vec::new(),
            sent_request_ids: Vec::new(),
            timers_installed: Vec::new(),
            timers_fired: Vec::new(),
            did_layout: false,
            did_paint: false,
            did_parse_html: false,
            follows: None,
        }
    }

    pub fn duration_us(&self) -> f64 {
        self.end_us - self.start_us
    }

    pub fn contains(&self, ts: f64) -> bool {
        ts >= self.start_us && ts < self.end_us
    }

    /// Fold a child event into the task's attribution
    pub fn attribute(&mut self, event: &TraceEvent) {
        if let Some(group) = TaskGroup::from_event_name(&event.name) {
            if group.rank() > self.group.rank() {
                self.group = group;
            }
        }

        match event.name.as_str() {
            "EvaluateScript" | "FunctionCall" | "v8.compile" => {
                if let Some(url) = event.data_str("url").or_else(|| event.args["fileName"].as_str()) {
                    self.push_url(url);
                }
            }
            "ParseAuthorStyleSheet" => {
                if let Some(url) = event.data_str("styleSheetUrl") {
                    self.push_url(url);
                }
            }
            "ParseHTML" => {
                self.did_parse_html = true;
                if let Some(url) = event.args["beginData"]["url"].as_str() {
                    self.push_url(url);
                }
            }
            "XHRReadyStateChange" => {
                if event.data()["readyState"].as_u64() == Some(4) {
                    if let Some(url) = event.data_str("url") {
                        self.push_url(url);
                    }
                }
            }
            "ResourceSendRequest" => {
                if let Some(id) = event.data_id("requestId") {
                    self.sent_request_ids.push(id);
                }
            }
            "TimerInstall" => {
                if let Some(id) = event.data_id("timerId") {
                    self.timers_installed.push(id);
                }
            }
            "TimerFire" => {
                if let Some(id) = event.data_id("timerId") {
                    self.timers_fired.push(id);
                }
            }
            "Layout" => self.did_layout = true,
            "Paint" => self.did_paint = true,
            _ => {}
        }

        for url in event.stack_urls() {
            self.push_url(url);
        }
    }

    fn push_url(&mut self, url: &str) {
        if !self.resource_urls.iter().any(|u| u == url) {
            self.resource_urls.push(url.to_string());
        }
    }
}

/// A top-level interval before segmentation
#[derive(Debug, Clone)]
pub(crate) struct RawInterval {
    pub name: String,
    pub start_us: f64,
    pub end_us: f64,
}

#[derive(Debug)]
struct IntervalNode {
    interval: RawInterval,
    children: Vec<usize>,
}

/// Turn possibly nested top-level intervals into non-overlapping tasks
///
/// A nested interval is cut out of its parent; an interval that only
/// partially overlaps its predecessor has its tail clipped to the
/// predecessor's end. The result is ordered by start time.
pub(crate) fn flatten_intervals(mut intervals: Vec<RawInterval>) -> Vec<CpuTask> {
    intervals.retain(|i| i.end_us > i.start_us);
    intervals.sort_by(|a, b| {
        a.start_us
            .total_cmp(&b.start_us)
            .then(b.end_us.total_cmp(&a.end_us))
    });

    let mut nodes: Vec<IntervalNode> = Vec::with_capacity(intervals.len());
    let mut roots = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    for mut interval in intervals {
        while let Some(&top) = stack.last() {
            if nodes[top].interval.end_us <= interval.start_us {
                stack.pop();
            } else {
                break;
            }
        }
        if let Some(&top) = stack.last() {
            let parent_end = nodes[top].interval.end_us;
            if interval.end_us > parent_end {
                log::debug!(
                    "clipping overlapping task {} at {}us to {}us",
                    interval.name,
                    interval.start_us,
                    parent_end
                );
                interval.end_us = parent_end;
            }
            if interval.end_us <= interval.start_us {
                continue;
            }
        }

        let id = nodes.len();
        nodes.push(IntervalNode {
            interval,
            children: Vec::new(),
        });
        match stack.last() {
            Some(&parent) => nodes[parent].children.push(id),
            None => roots.push(id),
        }
        stack.push(id);
    }

    let mut tasks = Vec::with_capacity(nodes.len());
    for root in roots {
        emit_segments(&nodes, root, None, &mut tasks);
    }
    tasks
}

/// Emit the segments of `node` around its children; returns the index of
/// the last emitted task
fn emit_segments(nodes: &[IntervalNode], node: usize, follows: Option<usize>, out: &mut Vec<CpuTask>) -> Option<usize> {
    let interval = &nodes[node].interval;
    let mut cursor = interval.start_us;
    let mut previous = follows;

    let push = |start: f64, end: f64, previous: Option<usize>, out: &mut Vec<CpuTask>| {
        let mut task = CpuTask::new(interval.name.clone(), start, end);
        task.follows = previous;
        out.push(task);
        out.len() - 1
    };

    for &child in &nodes[node].children {
        let child_start = nodes[child].interval.start_us;
        if child_start > cursor {
            previous = Some(push(cursor, child_start, previous, out));
        }
        previous = emit_segments(nodes, child, previous, out);
        cursor = nodes[child].interval.end_us;
    }

    if interval.end_us > cursor {
        previous = Some(push(cursor, interval.end_us, previous, out));
    }
    previous
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(start: f64, end: f64) -> RawInterval {
        RawInterval {
            name: "RunTask".to_string(),
            start_us: start,
            end_us: end,
        }
    }

    #[test]
    fn test_disjoint_tasks_are_kept() {
        let tasks = flatten_intervals(vec![raw(50.0, 60.0), raw(0.0, 10.0)]);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].start_us, 0.0);
        assert_eq!(tasks[1].follows, None);
    }

    #[test]
    fn test_nested_task_splits_outer() {
        let tasks = flatten_intervals(vec![raw(0.0, 100.0), raw(40.0, 60.0)]);
        let spans: Vec<(f64, f64)> = tasks.iter().map(|t| (t.start_us, t.end_us)).collect();
        assert_eq!(spans, vec![(0.0, 40.0), (40.0, 60.0), (60.0, 100.0)]);
        assert_eq!(tasks[0].follows, None);
        assert_eq!(tasks[1].follows, Some(0));
        assert_eq!(tasks[2].follows, Some(1));
    }

    #[test]
    fn test_nested_at_start_has_no_empty_segment() {
        let tasks = flatten_intervals(vec![raw(0.0, 100.0), raw(0.0, 30.0)]);
        let spans: Vec<(f64, f64)> = tasks.iter().map(|t| (t.start_us, t.end_us)).collect();
        assert_eq!(spans, vec![(0.0, 30.0), (30.0, 100.0)]);
        assert_eq!(tasks[1].follows, Some(0));
    }

    #[test]
    fn test_partial_overlap_is_clipped() {
        let tasks = flatten_intervals(vec![raw(0.0, 100.0), raw(80.0, 150.0)]);
        let spans: Vec<(f64, f64)> = tasks.iter().map(|t| (t.start_us, t.end_us)).collect();
        assert_eq!(spans, vec![(0.0, 80.0), (80.0, 100.0)]);
    }

    #[test]
    fn test_intervals_never_overlap() {
        let tasks = flatten_intervals(vec![
            raw(0.0, 100.0),
            raw(10.0, 20.0),
            raw(30.0, 90.0),
            raw(40.0, 50.0),
            raw(95.0, 130.0),
            raw(200.0, 210.0),
        ]);
        for pair in tasks.windows(2) {
            assert!(pair[0].end_us <= pair[1].start_us);
        }
    }

    #[test]
    fn test_attribute_child_events() {
        let event: TraceEvent = serde_json::from_value(serde_json::json!({
            "name": "EvaluateScript", "ph": "X", "ts": 1, "dur": 1, "pid": 1, "tid": 1,
            "args": {"data": {"url": "https://a.test/app.js"}}
        }))
        .unwrap();
        let mut task = CpuTask::new("RunTask", 0.0, 10.0);
        task.attribute(&event);
        task.attribute(&event);
        assert_eq!(task.group, TaskGroup::ScriptEvaluation);
        assert_eq!(task.resource_urls, vec!["https://a.test/app.js".to_string()]);
    }
}
