//! Network log normalization
//!
//! Folds the ordered protocol events of a network log into one
//! [`NetworkRequestRecord`] per request hop. Redirects reuse the protocol
//! request id; the recorder gives each new hop the previous hop's id plus a
//! `:redirect` suffix and links the hops into a chain. Events of unrelated
//! requests may interleave freely, events of one request are applied in log
//! order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::priority::{Priority, ResourceType};
use super::request::{
    base_request_id, Initiator, InitiatorType, NetworkRequestRecord, Protocol, ResourceTiming,
    REDIRECT_SUFFIX,
};
use crate::utils::{LanternError, Result};

/// Browsers give up after this many redirect hops
pub const MAX_REDIRECTS: usize = 20;

/// One raw protocol message from the network log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// An ordered network log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkLog {
    pub entries: Vec<LogEntry>,
}

impl NetworkLog {
    /// Parse a log serialized as a JSON array of `{method, params}` messages
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: Vec<LogEntry> = serde_json::from_str(json)
            .map_err(|e| LanternError::malformed_log("<log>", e.to_string()))?;
        Ok(Self { entries })
    }

    /// Build a log from already-decoded JSON messages
    pub fn from_values(values: Vec<Value>) -> Result<Self> {
        let entries = values
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<LogEntry>, _>>()
            .map_err(|e| LanternError::malformed_log("<log>", e.to_string()))?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    initial_priority: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct RawCallFrame {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStack {
    #[serde(default)]
    call_frames: Vec<RawCallFrame>,
    parent: Option<Box<RawStack>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInitiator {
    #[serde(rename = "type", default)]
    kind: String,
    url: Option<String>,
    stack: Option<RawStack>,
}

impl RawInitiator {
    fn to_initiator(&self) -> Initiator {
        Initiator {
            kind: InitiatorType::from_protocol(&self.kind),
            url: self.url.clone().filter(|u| !u.is_empty()),
            stack_urls: stack_urls(self.stack.as_ref()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTiming {
    request_time: f64,
    dns_start: Option<f64>,
    dns_end: Option<f64>,
    connect_start: Option<f64>,
    connect_end: Option<f64>,
    ssl_start: Option<f64>,
    ssl_end: Option<f64>,
    send_start: Option<f64>,
    send_end: Option<f64>,
    receive_headers_end: Option<f64>,
}

impl From<&RawTiming> for ResourceTiming {
    fn from(raw: &RawTiming) -> Self {
        // The protocol reports phases that did not happen as -1.
        let phase = |v: Option<f64>| v.filter(|v| *v >= 0.0);
        Self {
            request_time: raw.request_time,
            dns_start: phase(raw.dns_start),
            dns_end: phase(raw.dns_end),
            connect_start: phase(raw.connect_start),
            connect_end: phase(raw.connect_end),
            ssl_start: phase(raw.ssl_start),
            ssl_end: phase(raw.ssl_end),
            send_start: phase(raw.send_start),
            send_end: phase(raw.send_end),
            receive_headers_end: phase(raw.receive_headers_end),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    #[serde(default)]
    status: f64,
    #[serde(default)]
    mime_type: String,
    protocol: Option<String>,
    connection_id: Option<f64>,
    connection_reused: Option<bool>,
    #[serde(default)]
    from_disk_cache: bool,
    #[serde(default)]
    from_service_worker: bool,
    encoded_data_length: Option<f64>,
    timing: Option<RawTiming>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestWillBeSent {
    request_id: String,
    request: RawRequest,
    timestamp: f64,
    #[serde(default)]
    initiator: RawInitiator,
    redirect_response: Option<RawResponse>,
    #[serde(rename = "type")]
    resource_type: Option<String>,
    frame_id: Option<String>,
    #[serde(rename = "documentURL")]
    document_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseReceived {
    request_id: String,
    timestamp: f64,
    #[serde(rename = "type")]
    resource_type: Option<String>,
    #[serde(default)]
    response: RawResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataReceived {
    request_id: String,
    #[serde(default)]
    data_length: f64,
    #[serde(default)]
    encoded_data_length: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadingFinished {
    request_id: String,
    timestamp: f64,
    #[serde(default)]
    encoded_data_length: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadingFailed {
    request_id: String,
    timestamp: f64,
    #[serde(default)]
    error_text: String,
    #[serde(rename = "type")]
    resource_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestIdOnly {
    request_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceChangedPriority {
    request_id: String,
    new_priority: String,
}

/// Folds protocol events into request records
#[derive(Debug, Default)]
pub struct NetworkRecorder {
    records: Vec<NetworkRequestRecord>,
    /// Exact request id -> record index
    by_id: HashMap<String, usize>,
    /// Base request id -> record indices of the redirect chain, in hop order
    chains: HashMap<String, Vec<usize>>,
    /// Whether the record at the same index has received its response
    responded: Vec<bool>,
}

impl NetworkRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a whole log in one pass
    pub fn records_from_log(log: &NetworkLog) -> Result<Vec<NetworkRequestRecord>> {
        let mut recorder = Self::new();
        for entry in &log.entries {
            recorder.dispatch(entry)?;
        }
        recorder.finish()
    }

    /// Apply one protocol message
    pub fn dispatch(&mut self, entry: &LogEntry) -> Result<()> {
        match entry.method.as_str() {
            "Network.requestWillBeSent" => self.on_request_will_be_sent(parse(entry)?),
            "Network.requestServedFromCache" => {
                let event: RequestIdOnly = parse(entry)?;
                let idx = self.resolve(&event.request_id, "requestServedFromCache")?;
                self.records[idx].from_memory_cache = true;
                Ok(())
            }
            "Network.responseReceived" => self.on_response_received(parse(entry)?),
            "Network.dataReceived" => self.on_data_received(parse(entry)?),
            "Network.loadingFinished" => self.on_loading_finished(parse(entry)?),
            "Network.loadingFailed" => self.on_loading_failed(parse(entry)?),
            "Network.resourceChangedPriority" => {
                let event: ResourceChangedPriority = parse(entry)?;
                let idx = self.resolve(&event.request_id, "resourceChangedPriority")?;
                self.records[idx].priority = Priority::from_protocol(&event.new_priority);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_request_will_be_sent(&mut self, event: RequestWillBeSent) -> Result<()> {
        let known = self.chain_tail(&event.request_id);
        let explicit_hop = known.is_none() && event.request_id.ends_with(REDIRECT_SUFFIX);

        let previous = match known {
            Some(idx) if event.redirect_response.is_some() => Some(idx),
            Some(_) => {
                log::debug!("ignoring duplicate requestWillBeSent for {}", event.request_id);
                return Ok(());
            }
            None if explicit_hop => self.chain_tail(base_request_id(&event.request_id)),
            None => None,
        };

        let Some(previous) = previous else {
            if explicit_hop {
                log::warn!(
                    "redirect hop {} has no preceding request, recording it standalone",
                    event.request_id
                );
            }
            let record = self.new_record(&event.request_id, &event);
            self.insert(record, None);
            return Ok(());
        };

        // Close the hop that answered with a redirect.
        let redirect_response = event.redirect_response.as_ref();
        {
            let source = &mut self.records[previous];
            if let Some(response) = redirect_response {
                apply_response(source, response, event.timestamp);
            }
            source.end_time = event.timestamp.max(source.start_time);
            source.finished = true;
        }
        self.responded[previous] = true;

        let hop_id = if explicit_hop {
            event.request_id.clone()
        } else {
            format!("{}{}", self.records[previous].request_id, REDIRECT_SUFFIX)
        };
        let base = base_request_id(&hop_id).to_string();
        let hops = self.chains.get(&base).map_or(1, Vec::len);
        if hops > MAX_REDIRECTS {
            return Err(LanternError::malformed_log(
                hop_id,
                format!("redirect chain exceeds {} hops without a terminal response", MAX_REDIRECTS),
            ));
        }

        let mut record = self.new_record(&hop_id, &event);
        record.initiator = Initiator {
            kind: InitiatorType::Redirect,
            url: Some(self.records[previous].url.clone()),
            stack_urls: Vec::new(),
        };
        record.redirect_source = Some(self.records[previous].request_id.clone());
        record.initiator_request_id = record.redirect_source.clone();
        // Redirect hops inherit the navigation's type and priority.
        record.resource_type = self.records[previous].resource_type;
        record.priority = self.records[previous].priority;
        self.records[previous].redirect_destination = Some(hop_id.clone());
        self.insert(record, Some(base));
        Ok(())
    }

    fn on_response_received(&mut self, event: ResponseReceived) -> Result<()> {
        let idx = self.resolve(&event.request_id, "responseReceived")?;
        let record = &mut self.records[idx];
        apply_response(record, &event.response, event.timestamp);
        if let Some(kind) = event.resource_type.as_deref() {
            record.resource_type = ResourceType::from_protocol(kind);
        }
        self.responded[idx] = true;
        Ok(())
    }

    fn on_data_received(&mut self, event: DataReceived) -> Result<()> {
        let idx = self.resolve(&event.request_id, "dataReceived")?;
        let record = &mut self.records[idx];
        record.resource_size += event.data_length.max(0.0) as u64;
        record.transfer_size += event.encoded_data_length.max(0.0) as u64;
        Ok(())
    }

    fn on_loading_finished(&mut self, event: LoadingFinished) -> Result<()> {
        let idx = self.resolve(&event.request_id, "loadingFinished")?;
        let record = &mut self.records[idx];
        if event.encoded_data_length > 0.0 {
            record.transfer_size = event.encoded_data_length as u64;
        }
        record.end_time = event.timestamp.max(record.response_received_time);
        record.finished = true;
        Ok(())
    }

    fn on_loading_failed(&mut self, event: LoadingFailed) -> Result<()> {
        let idx = self.resolve(&event.request_id, "loadingFailed")?;
        let record = &mut self.records[idx];
        if let Some(kind) = event.resource_type.as_deref() {
            record.resource_type = ResourceType::from_protocol(kind);
        }
        record.end_time = event.timestamp.max(record.start_time);
        if !self.responded[idx] {
            record.response_received_time = record.end_time;
        }
        record.finished = true;
        record.failed = true;
        record.failure_text = Some(event.error_text);
        Ok(())
    }

    /// Finalize records: resolve initiators, close unfinished requests and
    /// order by start time
    pub fn finish(mut self) -> Result<Vec<NetworkRequestRecord>> {
        for (base, chain) in &self.chains {
            let terminals = chain
                .iter()
                .filter(|idx| self.records[**idx].is_terminal())
                .count();
            if terminals != 1 {
                return Err(LanternError::malformed_log(
                    base.clone(),
                    format!("redirect chain resolves to {} terminal records", terminals),
                ));
            }
        }

        for record in &mut self.records {
            if !record.finished {
                log::warn!("request {} never finished, closing at its last event", record.request_id);
                record.end_time = record.end_time.max(record.response_received_time);
            }
            if record.resource_type == ResourceType::Other && !record.mime_type.is_empty() {
                record.resource_type = ResourceType::from_mime_type(&record.mime_type);
            }
        }

        let parents: Vec<Option<String>> = (0..self.records.len())
            .map(|idx| self.choose_initiator_request(idx))
            .collect();
        for (record, parent) in self.records.iter_mut().zip(parents) {
            if record.initiator_request_id.is_none() {
                record.initiator_request_id = parent;
            }
        }

        let mut records = self.records;
        records.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Ok(records)
    }

    /// Pick the unambiguous request that initiated the record at `idx`
    fn choose_initiator_request(&self, idx: usize) -> Option<String> {
        let record = &self.records[idx];
        let initiator_url = *record.initiator.candidate_urls().first()?;

        let mut candidates: Vec<&NetworkRequestRecord> = self
            .records
            .iter()
            .filter(|c| {
                c.url == initiator_url
                    && c.request_id != record.request_id
                    && c.is_terminal()
                    && !c.failed
                    && c.response_received_time <= record.start_time
            })
            .collect();

        if candidates.len() > 1 {
            let same_frame: Vec<_> = candidates
                .iter()
                .copied()
                .filter(|c| c.frame_id.is_some() && c.frame_id == record.frame_id)
                .collect();
            if !same_frame.is_empty() {
                candidates = same_frame;
            }
        }
        if candidates.len() > 1 && record.initiator.kind == InitiatorType::Parser {
            let documents: Vec<_> = candidates.iter().copied().filter(|c| c.is_document()).collect();
            if !documents.is_empty() {
                candidates = documents;
            }
        }

        match candidates.as_slice() {
            [only] => Some(only.request_id.clone()),
            _ => None,
        }
    }

    fn new_record(&self, request_id: &str, event: &RequestWillBeSent) -> NetworkRequestRecord {
        let mut record = NetworkRequestRecord::new(request_id, &event.request.url, event.timestamp);
        record.method = event.request.method.clone();
        record.resource_type = event
            .resource_type
            .as_deref()
            .map(ResourceType::from_protocol)
            .unwrap_or_default();
        record.priority = event
            .request
            .initial_priority
            .as_deref()
            .map(Priority::from_protocol)
            .unwrap_or_else(|| record.resource_type.default_priority());
        record.initiator = event.initiator.to_initiator();
        record.is_link_preload = record.initiator.kind == InitiatorType::Preload;
        record.frame_id = event.frame_id.clone();
        if let Some(document_url) = &event.document_url {
            record.document_url = document_url.clone();
        }
        record
    }

    fn insert(&mut self, record: NetworkRequestRecord, chain: Option<String>) {
        let idx = self.records.len();
        let base = chain.unwrap_or_else(|| record.request_id.clone());
        self.by_id.insert(record.request_id.clone(), idx);
        self.chains.entry(base).or_default().push(idx);
        self.records.push(record);
        self.responded.push(false);
    }

    /// The current hop of the chain an id belongs to
    fn chain_tail(&self, request_id: &str) -> Option<usize> {
        if let Some(chain) = self.chains.get(request_id) {
            return chain.last().copied();
        }
        self.by_id.get(request_id).copied()
    }

    fn resolve(&self, request_id: &str, event: &str) -> Result<usize> {
        // Explicitly suffixed ids address their own hop; bare ids address
        // the latest hop of the chain.
        let idx = if request_id.ends_with(REDIRECT_SUFFIX) {
            self.by_id.get(request_id).copied()
        } else {
            self.chain_tail(request_id)
        };
        idx.ok_or_else(|| {
            LanternError::malformed_log(
                request_id,
                format!("{} references a request that was never sent", event),
            )
        })
    }
}

fn stack_urls(stack: Option<&RawStack>) -> Vec<String> {
    let mut urls = Vec::new();
    let mut stack = stack;
    while let Some(s) = stack {
        urls.extend(
            s.call_frames
                .iter()
                .filter(|f| !f.url.is_empty())
                .map(|f| f.url.clone()),
        );
        stack = s.parent.as_deref();
    }
    urls
}

fn apply_response(record: &mut NetworkRequestRecord, response: &RawResponse, timestamp: f64) {
    record.response_received_time = timestamp.max(record.start_time);
    record.end_time = record.end_time.max(record.response_received_time);
    record.status_code = response.status.max(0.0) as u16;
    record.mime_type = response.mime_type.clone();
    if let Some(protocol) = &response.protocol {
        if record.protocol != Protocol::NonNetwork {
            record.protocol = Protocol::from_protocol(protocol);
        }
    }
    if let Some(id) = response.connection_id {
        record.connection_id = id.max(0.0) as u64;
    }
    if let Some(reused) = response.connection_reused {
        record.connection_reused = reused;
    }
    record.from_disk_cache |= response.from_disk_cache;
    record.from_service_worker |= response.from_service_worker;
    if let Some(length) = response.encoded_data_length {
        record.transfer_size = length.max(0.0) as u64;
    }
    if let Some(timing) = &response.timing {
        record.timing = Some(ResourceTiming::from(timing));
    }
}

fn parse<T: for<'de> Deserialize<'de>>(entry: &LogEntry) -> Result<T> {
    serde_json::from_value(entry.params.clone()).map_err(|e| {
        let id = entry
            .params
            .get("requestId")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>");
        LanternError::malformed_log(id, format!("{}: {}", entry.method, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn will_be_sent(id: &str, url: &str, ts: f64) -> Value {
        json!({
            "method": "Network.requestWillBeSent",
            "params": {
                "requestId": id,
                "request": {"url": url, "method": "GET", "initialPriority": "VeryHigh"},
                "timestamp": ts,
                "initiator": {"type": "other"},
                "type": "Document",
            }
        })
    }

    fn redirect(id: &str, url: &str, ts: f64) -> Value {
        let mut event = will_be_sent(id, url, ts);
        event["params"]["redirectResponse"] = json!({"status": 302, "mimeType": "", "encodedDataLength": 200});
        event
    }

    fn finished(id: &str, ts: f64, bytes: f64) -> Value {
        json!({
            "method": "Network.loadingFinished",
            "params": {"requestId": id, "timestamp": ts, "encodedDataLength": bytes}
        })
    }

    fn records(values: Vec<Value>) -> Result<Vec<NetworkRequestRecord>> {
        NetworkRecorder::records_from_log(&NetworkLog::from_values(values)?)
    }

    #[test]
    fn test_single_request() {
        let records = records(vec![
            will_be_sent("1", "https://example.com/", 1.0),
            json!({"method": "Network.responseReceived", "params": {
                "requestId": "1", "timestamp": 1.2, "type": "Document",
                "response": {"status": 200, "mimeType": "text/html", "protocol": "h2",
                             "connectionId": 7, "connectionReused": false}
            }}),
            finished("1", 1.5, 5000.0),
        ])
        .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.protocol, Protocol::H2);
        assert_eq!(record.connection_id, 7);
        assert_eq!(record.transfer_size, 5000);
        assert_eq!(record.end_time, 1.5);
        assert!(record.finished);
    }

    #[test]
    fn test_redirect_chain_collapses() {
        let records = records(vec![
            will_be_sent("1", "http://a.test/", 1.0),
            redirect("1", "https://a.test/", 1.1),
            redirect("1", "https://www.a.test/", 1.2),
            finished("1", 1.5, 1000.0),
        ])
        .unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.request_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "1:redirect", "1:redirect:redirect"]);
        assert!(!records[0].is_terminal());
        assert!(!records[1].is_terminal());
        assert!(records[2].is_terminal());
        assert_eq!(records[2].url, "https://www.a.test/");
        assert_eq!(records[2].redirect_source.as_deref(), Some("1:redirect"));
        assert_eq!(records[2].transfer_size, 1000);
        assert_eq!(records[0].end_time, 1.1);
    }

    #[test]
    fn test_unknown_request_is_malformed() {
        let err = records(vec![finished("nope", 1.0, 10.0)]).unwrap_err();
        assert!(matches!(err, LanternError::MalformedLog { ref request_id, .. } if request_id == "nope"));
    }

    #[test]
    fn test_interleaved_requests() {
        let records = records(vec![
            will_be_sent("1", "https://a.test/", 1.0),
            will_be_sent("2", "https://a.test/b.css", 1.1),
            finished("2", 1.3, 100.0),
            finished("1", 1.4, 200.0),
        ])
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].request_id, "1");
        assert_eq!(records[1].transfer_size, 100);
    }

    #[test]
    fn test_served_from_cache_and_failure() {
        let records = records(vec![
            will_be_sent("1", "https://a.test/", 1.0),
            json!({"method": "Network.requestServedFromCache", "params": {"requestId": "1"}}),
            json!({"method": "Network.loadingFailed", "params": {
                "requestId": "1", "timestamp": 1.2, "errorText": "net::ERR_ABORTED"}}),
        ])
        .unwrap();
        assert!(records[0].from_memory_cache);
        assert!(records[0].failed);
        assert_eq!(records[0].failure_text.as_deref(), Some("net::ERR_ABORTED"));
    }

    #[test]
    fn test_too_many_redirects() {
        let mut values = vec![will_be_sent("1", "https://a.test/0", 1.0)];
        for hop in 1..=MAX_REDIRECTS + 1 {
            values.push(redirect("1", &format!("https://a.test/{}", hop), 1.0 + hop as f64 * 0.01));
        }
        assert!(matches!(records(values), Err(LanternError::MalformedLog { .. })));
    }

    #[test]
    fn test_initiator_resolution() {
        let mut css = will_be_sent("2", "https://a.test/style.css", 1.5);
        css["params"]["initiator"] = json!({"type": "parser", "url": "https://a.test/"});
        css["params"]["type"] = json!("Stylesheet");
        let records = records(vec![
            will_be_sent("1", "https://a.test/", 1.0),
            json!({"method": "Network.responseReceived", "params": {
                "requestId": "1", "timestamp": 1.2, "response": {"status": 200, "mimeType": "text/html"}}}),
            css,
            finished("1", 1.6, 100.0),
            finished("2", 1.7, 100.0),
        ])
        .unwrap();
        assert_eq!(records[1].initiator_request_id.as_deref(), Some("1"));
        assert_eq!(records[1].resource_type, ResourceType::Stylesheet);
    }
}
