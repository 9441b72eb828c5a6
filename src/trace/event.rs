//! Raw trace events
//!
//! Events use the Chrome trace event format: `ts` and `dur` are in
//! microseconds, `ph` is the phase code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{LanternError, Result};

/// Trace event phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `X`: begin and duration in one event
    Complete,
    /// `B`
    Begin,
    /// `E`
    End,
    /// `I`, `i`, `R`, `n`
    Instant,
    /// `M`
    Metadata,
    Other,
}

impl Phase {
    pub fn from_code(code: &str) -> Self {
        match code {
            "X" => Self::Complete,
            "B" => Self::Begin,
            "E" => Self::End,
            "I" | "i" | "R" | "n" => Self::Instant,
            "M" => Self::Metadata,
            _ => Self::Other,
        }
    }
}

/// One trace event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    #[serde(default)]
    pub cat: String,
    pub ph: String,
    #[serde(default)]
    pub ts: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dur: Option<f64>,
    #[serde(default)]
    pub pid: u64,
    #[serde(default)]
    pub tid: u64,
    #[serde(default)]
    pub args: Value,
}

impl TraceEvent {
    pub fn phase(&self) -> Phase {
        Phase::from_code(&self.ph)
    }

    /// `args.data`, or `Value::Null`
    pub fn data(&self) -> &Value {
        &self.args["data"]
    }

    /// String field of `args.data`
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data()[field].as_str().filter(|s| !s.is_empty())
    }

    /// Identifier field of `args.data`, which traces emit as string or number
    pub fn data_id(&self, field: &str) -> Option<String> {
        match &self.data()[field] {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// URLs of the JavaScript stack attached to the event
    pub fn stack_urls(&self) -> impl Iterator<Item = &str> {
        self.data()["stackTrace"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|frame| frame["url"].as_str())
            .filter(|url| !url.is_empty())
    }

    pub fn is_on(&self, pid: u64, tid: u64) -> bool {
        self.pid == pid && self.tid == tid
    }
}

/// A decoded trace, events in file order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "traceEvents")]
    pub events: Vec<TraceEvent>,
}

impl Trace {
    pub fn new(events: Vec<TraceEvent>) -> Self {
        Self { events }
    }

    /// Parse `{"traceEvents": [...]}` or a bare event array
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| LanternError::malformed_trace(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let events = match value {
            Value::Array(_) => value,
            Value::Object(mut map) => map
                .remove("traceEvents")
                .ok_or_else(|| LanternError::malformed_trace("missing `traceEvents`"))?,
            _ => return Err(LanternError::malformed_trace("expected an object or an array")),
        };
        let events: Vec<TraceEvent> =
            serde_json::from_value(events).map_err(|e| LanternError::malformed_trace(e.to_string()))?;
        Ok(Self { events })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wrapped_and_bare() {
        let event = json!({"name": "RunTask", "ph": "X", "ts": 10, "dur": 5, "pid": 1, "tid": 2});
        let wrapped = Trace::from_value(json!({"traceEvents": [event.clone()]})).unwrap();
        let bare = Trace::from_value(json!([event])).unwrap();
        assert_eq!(wrapped, bare);
        assert_eq!(bare.events[0].dur, Some(5.0));
        assert_eq!(bare.events[0].phase(), Phase::Complete);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Trace::from_json_str("{\"nope\": 1}"),
            Err(LanternError::MalformedTrace { .. })
        ));
        assert!(Trace::from_json_str("not json").is_err());
    }

    #[test]
    fn test_event_data_accessors() {
        let trace = Trace::from_value(json!([{
            "name": "TimerInstall", "ph": "I", "ts": 1, "pid": 1, "tid": 1,
            "args": {"data": {"timerId": 7, "stackTrace": [{"url": "https://a.test/x.js"}, {"url": ""}]}}
        }]))
        .unwrap();
        let event = &trace.events[0];
        assert_eq!(event.data_id("timerId").as_deref(), Some("7"));
        assert_eq!(event.stack_urls().collect::<Vec<_>>(), vec!["https://a.test/x.js"]);
        assert_eq!(event.data_str("url"), None);
    }
}
