//! Resource types and loading priorities
//!
//! Mirrors the resource typing and priority levels reported by the browser's
//! network log. The simulator uses them to decide which requests block
//! rendering and in what order queued requests acquire a connection.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Resource type as reported by the network log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResourceType {
    /// HTML document (main frame or iframe)
    Document,
    /// CSS stylesheet
    Stylesheet,
    /// Image
    Image,
    /// Audio or video
    Media,
    /// Web font
    Font,
    /// JavaScript
    Script,
    TextTrack,
    #[serde(rename = "XHR")]
    Xhr,
    Fetch,
    Prefetch,
    EventSource,
    WebSocket,
    Manifest,
    SignedExchange,
    Ping,
    #[serde(rename = "CSPViolationReport")]
    CspViolationReport,
    Preflight,
    /// Anything else
    #[default]
    #[serde(other)]
    Other,
}

impl ResourceType {
    /// Parse the protocol's resource type name, falling back to `Other`
    pub fn from_protocol(name: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(name.to_string())).unwrap_or_default()
    }

    /// Guess the resource type from a MIME type
    pub fn from_mime_type(mime_type: &str) -> Self {
        let ct = mime_type.to_lowercase();

        if ct.contains("html") {
            Self::Document
        } else if ct.contains("css") {
            Self::Stylesheet
        } else if ct.contains("javascript") || ct.contains("ecmascript") {
            Self::Script
        } else if ct.contains("font") || ct.contains("woff") || ct.contains("ttf") {
            Self::Font
        } else if ct.starts_with("image/") {
            Self::Image
        } else if ct.starts_with("video/") || ct.starts_with("audio/") {
            Self::Media
        } else if ct.contains("json") {
            Self::Fetch
        } else {
            Self::Other
        }
    }

    /// Browser default priority when the log omits one
    pub fn default_priority(&self) -> Priority {
        match self {
            Self::Document | Self::Stylesheet => Priority::VeryHigh,
            Self::Font | Self::Script | Self::Xhr | Self::Fetch => Priority::High,
            Self::Image | Self::Media | Self::Other => Priority::Low,
            Self::Prefetch | Self::Ping | Self::CspViolationReport => Priority::VeryLow,
            _ => Priority::Medium,
        }
    }
}

/// Resource priority levels, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Priority {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl Priority {
    /// Parse the protocol's priority name, falling back to `Medium`
    pub fn from_protocol(name: &str) -> Self {
        match name {
            "VeryLow" => Self::VeryLow,
            "Low" => Self::Low,
            "High" => Self::High,
            "VeryHigh" => Self::VeryHigh,
            _ => Self::Medium,
        }
    }
}

/// Whether a request at this priority/type is treated as render blocking
///
/// Everything the browser marks `VeryHigh` blocks, as do `High` scripts and
/// documents (synchronous parser-blocking loads).
pub fn has_render_blocking_priority(priority: Priority, resource_type: ResourceType) -> bool {
    match priority {
        Priority::VeryHigh => true,
        Priority::High => matches!(resource_type, ResourceType::Script | ResourceType::Document),
        _ => false,
    }
}

/// A request waiting for a connection slot
///
/// Ordered so that a max-heap pops the highest priority first, then the
/// earliest ready time, then the earliest insertion.
#[derive(Debug, Clone, Copy)]
pub struct QueuedRequest<T> {
    pub item: T,
    pub priority: Priority,
    pub ready_time: f64,
    pub sequence: u64,
}

impl<T> PartialEq for QueuedRequest<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for QueuedRequest<T> {}

impl<T> PartialOrd for QueuedRequest<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueuedRequest<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.ready_time.total_cmp(&self.ready_time))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn test_resource_type_from_protocol() {
        assert_eq!(ResourceType::from_protocol("Stylesheet"), ResourceType::Stylesheet);
        assert_eq!(ResourceType::from_protocol("XHR"), ResourceType::Xhr);
        assert_eq!(ResourceType::from_protocol("SomethingNew"), ResourceType::Other);
    }

    #[test]
    fn test_resource_type_from_mime_type() {
        assert_eq!(ResourceType::from_mime_type("text/html; charset=utf-8"), ResourceType::Document);
        assert_eq!(ResourceType::from_mime_type("application/javascript"), ResourceType::Script);
        assert_eq!(ResourceType::from_mime_type("image/webp"), ResourceType::Image);
        assert_eq!(ResourceType::from_mime_type("font/woff2"), ResourceType::Font);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::VeryHigh > Priority::High);
        assert!(Priority::Low > Priority::VeryLow);
        assert_eq!(Priority::from_protocol("bogus"), Priority::Medium);
    }

    #[test]
    fn test_render_blocking_priority() {
        assert!(has_render_blocking_priority(Priority::VeryHigh, ResourceType::Stylesheet));
        assert!(has_render_blocking_priority(Priority::High, ResourceType::Script));
        assert!(!has_render_blocking_priority(Priority::High, ResourceType::Image));
        assert!(!has_render_blocking_priority(Priority::Low, ResourceType::Script));
    }

    #[test]
    fn test_request_queue_order() {
        let mut queue = BinaryHeap::new();
        queue.push(QueuedRequest { item: "image", priority: Priority::Low, ready_time: 0.0, sequence: 0 });
        queue.push(QueuedRequest { item: "late-css", priority: Priority::VeryHigh, ready_time: 5.0, sequence: 1 });
        queue.push(QueuedRequest { item: "css", priority: Priority::VeryHigh, ready_time: 1.0, sequence: 2 });
        queue.push(QueuedRequest { item: "css-tie", priority: Priority::VeryHigh, ready_time: 1.0, sequence: 3 });

        let order: Vec<_> = std::iter::from_fn(|| queue.pop().map(|q| q.item)).collect();
        assert_eq!(order, vec!["css", "css-tie", "late-css", "image"]);
    }
}
