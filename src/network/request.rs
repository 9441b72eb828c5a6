//! Normalized network request records

use serde::{Deserialize, Serialize};
use url::Url;

use super::priority::{has_render_blocking_priority, Priority, ResourceType};

/// Suffix the recorder appends to a request id for every redirect hop
pub const REDIRECT_SUFFIX: &str = ":redirect";

/// Application protocol negotiated for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Protocol {
    Http10,
    #[default]
    Http11,
    H2,
    H3,
    /// `data:`, `blob:`, extension and other schemes served without a socket
    NonNetwork,
}

impl Protocol {
    /// Parse the protocol string reported in a response
    pub fn from_protocol(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "http/1.0" => Self::Http10,
            "h2" | "http/2" | "http/2.0" | "spdy" => Self::H2,
            "h3" | "http/3" | "quic" | "http/2+quic/43" => Self::H3,
            "data" | "blob" => Self::NonNetwork,
            _ => Self::Http11,
        }
    }

    /// Whether many requests share one connection concurrently
    pub fn is_multiplexed(&self) -> bool {
        matches!(self, Self::H2 | Self::H3)
    }
}

/// How a request was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InitiatorType {
    Parser,
    Script,
    Preload,
    Redirect,
    #[default]
    Other,
}

impl InitiatorType {
    pub fn from_protocol(name: &str) -> Self {
        match name {
            "parser" => Self::Parser,
            "script" => Self::Script,
            "preload" => Self::Preload,
            "redirect" => Self::Redirect,
            _ => Self::Other,
        }
    }
}

/// Initiator reference carried by a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Initiator {
    pub kind: InitiatorType,
    /// Document or stylesheet that referenced the resource
    pub url: Option<String>,
    /// Script URLs on the call stack that issued the request, innermost first
    pub stack_urls: Vec<String>,
}

impl Initiator {
    /// Candidate initiator URLs, most specific first
    pub fn candidate_urls(&self) -> Vec<&str> {
        if let Some(url) = &self.url {
            return vec![url.as_str()];
        }
        if self.kind == InitiatorType::Script {
            let mut urls: Vec<&str> = Vec::new();
            for url in &self.stack_urls {
                if !urls.contains(&url.as_str()) {
                    urls.push(url.as_str());
                }
            }
            return urls;
        }
        Vec::new()
    }
}

/// Connection phase offsets reported by the browser, in milliseconds
/// relative to `request_time`; `None` for phases that did not happen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceTiming {
    /// Base time in seconds
    pub request_time: f64,
    pub dns_start: Option<f64>,
    pub dns_end: Option<f64>,
    pub connect_start: Option<f64>,
    pub connect_end: Option<f64>,
    pub ssl_start: Option<f64>,
    pub ssl_end: Option<f64>,
    pub send_start: Option<f64>,
    pub send_end: Option<f64>,
    pub receive_headers_end: Option<f64>,
}

impl ResourceTiming {
    /// Time from the end of the request send to the first response byte
    pub fn waiting_ms(&self) -> Option<f64> {
        match (self.send_end, self.receive_headers_end) {
            (Some(send), Some(headers)) if headers >= send => Some(headers - send),
            _ => None,
        }
    }

    /// TCP connect duration, excluding TLS
    pub fn connect_ms(&self) -> Option<f64> {
        let (start, end) = (self.connect_start?, self.connect_end?);
        let tcp_end = self.ssl_start.filter(|s| *s >= start).unwrap_or(end);
        (tcp_end > start).then_some(tcp_end - start)
    }
}

/// One logical network request, normalized from protocol events
///
/// Times are monotonic seconds, in the same clock base as trace timestamps
/// (trace microseconds / 1e6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRequestRecord {
    /// Request id; redirect hops carry one `:redirect` suffix per hop
    pub request_id: String,
    pub url: String,
    /// Scheme + host + port, the unit of connection pooling
    pub origin: String,
    pub host: String,
    pub is_secure: bool,
    pub method: String,
    pub resource_type: ResourceType,
    pub priority: Priority,
    pub mime_type: String,
    pub status_code: u16,
    pub protocol: Protocol,
    pub connection_id: u64,
    pub connection_reused: bool,
    pub from_disk_cache: bool,
    pub from_memory_cache: bool,
    pub from_service_worker: bool,
    pub start_time: f64,
    pub response_received_time: f64,
    pub end_time: f64,
    pub transfer_size: u64,
    pub resource_size: u64,
    pub finished: bool,
    pub failed: bool,
    pub failure_text: Option<String>,
    pub timing: Option<ResourceTiming>,
    pub initiator: Initiator,
    /// Resolved causal predecessor, filled in once all records are known
    pub initiator_request_id: Option<String>,
    pub redirect_source: Option<String>,
    pub redirect_destination: Option<String>,
    pub frame_id: Option<String>,
    pub document_url: String,
    pub is_link_preload: bool,
}

impl NetworkRequestRecord {
    /// Create a record at the moment the request is sent
    pub fn new(request_id: impl Into<String>, url: impl Into<String>, start_time: f64) -> Self {
        let url = url.into();
        let (origin, host, is_secure, non_network) = parse_origin(&url);
        Self {
            request_id: request_id.into(),
            origin,
            host,
            is_secure,
            method: "GET".to_string(),
            resource_type: ResourceType::Other,
            priority: Priority::Medium,
            mime_type: String::new(),
            status_code: 0,
            protocol: if non_network {
                Protocol::NonNetwork
            } else {
                Protocol::Http11
            },
            connection_id: 0,
            connection_reused: false,
            from_disk_cache: false,
            from_memory_cache: false,
            from_service_worker: false,
            start_time,
            response_received_time: start_time,
            end_time: start_time,
            transfer_size: 0,
            resource_size: 0,
            finished: false,
            failed: false,
            failure_text: None,
            timing: None,
            initiator: Initiator::default(),
            initiator_request_id: None,
            redirect_source: None,
            redirect_destination: None,
            frame_id: None,
            document_url: url.clone(),
            is_link_preload: false,
            url,
        }
    }

    /// Base id shared by every hop of a redirect chain
    pub fn base_request_id(&self) -> &str {
        base_request_id(&self.request_id)
    }

    /// Whether this hop was answered with a redirect
    pub fn is_redirect(&self) -> bool {
        self.redirect_destination.is_some()
    }

    /// Whether this is the final hop of its chain
    pub fn is_terminal(&self) -> bool {
        !self.is_redirect()
    }

    /// Whether the record was served without touching the network
    pub fn is_connectionless(&self) -> bool {
        self.from_disk_cache
            || self.from_memory_cache
            || self.from_service_worker
            || self.protocol == Protocol::NonNetwork
    }

    /// Whether the browser treated this request as render blocking
    pub fn has_render_blocking_priority(&self) -> bool {
        has_render_blocking_priority(self.priority, self.resource_type)
    }

    /// Whether this is a navigation to a document
    pub fn is_document(&self) -> bool {
        self.resource_type == ResourceType::Document
    }
}

/// Strip every redirect suffix from a request id
pub fn base_request_id(request_id: &str) -> &str {
    let mut id = request_id;
    while let Some(stripped) = id.strip_suffix(REDIRECT_SUFFIX) {
        id = stripped;
    }
    id
}

/// Split a URL into (origin, host, is_secure, is_non_network)
fn parse_origin(raw: &str) -> (String, String, bool, bool) {
    match Url::parse(raw) {
        Ok(url) => {
            let non_network = !matches!(url.scheme(), "http" | "https" | "ws" | "wss");
            let secure = matches!(url.scheme(), "https" | "wss");
            let host = url.host_str().unwrap_or_default().to_string();
            let origin = if non_network {
                format!("{}:", url.scheme())
            } else {
                url.origin().ascii_serialization()
            };
            (origin, host, secure, non_network)
        }
        Err(_) => {
            log::warn!("unparseable request url `{}`, pooling it on its own", raw);
            (raw.to_string(), String::new(), false, false)
        }
    }
}
