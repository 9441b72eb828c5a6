//! Error types for the Lantern simulator

use thiserror::Error;

/// Main error type for Lantern operations
///
/// Every variant carries the identifier (request id, event name, metric)
/// needed to diagnose the failing input. The type is `Clone` so a single
/// in-flight result can be handed to every waiter of the result cache.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LanternError {
    /// A protocol event references an unknown request, or a redirect chain
    /// cannot be resolved to a terminal record
    #[error("malformed network log at request {request_id}: {reason}")]
    MalformedLog { request_id: String, reason: String },

    /// The trace lacks the events needed to locate the page load
    #[error("malformed trace: {reason}")]
    MalformedTrace { reason: String },

    /// No navigation (document) request exists to root the graph
    #[error("no root navigation request found in network log")]
    MissingRootNode,

    /// A metric's anchor event is absent from the trace
    #[error("{metric}: anchor event `{event}` not found")]
    NodeNotFound { metric: String, event: String },

    /// Nodes are ready but none can start and none is running
    #[error("simulation stalled with {pending} unfinished node(s)")]
    SimulationStalled { pending: usize },

    /// Settings failed validation
    #[error("invalid settings: {reason}")]
    InvalidSettings { reason: String },

    /// Settings file could not be loaded
    #[error("failed to load settings from {path}: {reason}")]
    Config { path: String, reason: String },

    /// An orchestration task panicked or was cancelled
    #[error("background computation aborted: {reason}")]
    TaskAborted { reason: String },
}

impl LanternError {
    /// Shorthand for a [`LanternError::MalformedLog`]
    pub fn malformed_log(request_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedLog {
            request_id: request_id.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`LanternError::MalformedTrace`]
    pub fn malformed_trace(reason: impl Into<String>) -> Self {
        Self::MalformedTrace {
            reason: reason.into(),
        }
    }

    /// Whether this error concerns the whole page load rather than one
    /// metric's anchor or dependencies
    pub fn is_fatal_to_page(&self) -> bool {
        !matches!(self, Self::NodeNotFound { .. })
    }
}

impl From<tokio::task::JoinError> for LanternError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskAborted {
            reason: err.to_string(),
        }
    }
}

/// Convenience Result type for Lantern operations
pub type Result<T> = std::result::Result<T, LanternError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_identifier() {
        let err = LanternError::malformed_log("1234.5", "response for unknown request");
        assert!(err.to_string().contains("1234.5"));

        let err = LanternError::NodeNotFound {
            metric: "first-contentful-paint".to_string(),
            event: "firstContentfulPaint".to_string(),
        };
        assert!(err.to_string().contains("firstContentfulPaint"));
    }

    #[test]
    fn test_fatality() {
        assert!(LanternError::MissingRootNode.is_fatal_to_page());
        assert!(
            !LanternError::NodeNotFound {
                metric: "m".to_string(),
                event: "e".to_string(),
            }
            .is_fatal_to_page()
        );
    }
}
