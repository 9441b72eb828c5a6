//! Graph nodes
//!
//! Nodes live in the [`DependencyGraph`](super::DependencyGraph) arena and
//! are addressed by [`NodeId`]. Node times are in trace microseconds; a
//! network record's monotonic seconds are scaled onto the same clock.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::network::request::NetworkRequestRecord;
use crate::trace::CpuTask;

/// Index of a node in its graph's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A network request in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkNode {
    pub record: NetworkRequestRecord,
    /// Terminal hop of the navigation's redirect chain
    pub is_main_document: bool,
}

impl NetworkNode {
    /// Whether the request was made by script rather than discovered by the parser
    pub fn is_initiated_by_script(&self) -> bool {
        self.record.initiator.kind == crate::network::request::InitiatorType::Script
    }
}

/// A main-thread task in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct CpuNode {
    pub task: CpuTask,
}

/// Tagged graph node
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Network(NetworkNode),
    Cpu(CpuNode),
}

impl GraphNode {
    pub fn start_us(&self) -> f64 {
        match self {
            GraphNode::Network(n) => n.record.start_time * 1_000_000.0,
            GraphNode::Cpu(c) => c.task.start_us,
        }
    }

    pub fn end_us(&self) -> f64 {
        match self {
            GraphNode::Network(n) => n.record.end_time * 1_000_000.0,
            GraphNode::Cpu(c) => c.task.end_us,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, GraphNode::Network(_))
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self, GraphNode::Cpu(_))
    }

    pub fn as_network(&self) -> Option<&NetworkNode> {
        match self {
            GraphNode::Network(n) => Some(n),
            GraphNode::Cpu(_) => None,
        }
    }

    pub fn as_cpu(&self) -> Option<&CpuNode> {
        match self {
            GraphNode::Cpu(c) => Some(c),
            GraphNode::Network(_) => None,
        }
    }

    /// Short human-readable label for logs
    pub fn label(&self) -> String {
        match self {
            GraphNode::Network(n) => format!("{} {}", n.record.request_id, n.record.url),
            GraphNode::Cpu(c) => format!("{}@{}us", c.task.name, c.task.start_us),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_node_times_in_microseconds() {
        let mut record = NetworkRequestRecord::new("1", "https://a.test/", 1.5);
        record.end_time = 2.0;
        let node = GraphNode::Network(NetworkNode {
            record,
            is_main_document: true,
        });
        assert_eq!(node.start_us(), 1_500_000.0);
        assert_eq!(node.end_us(), 2_000_000.0);
        assert!(node.is_network());
        assert!(node.as_cpu().is_none());
    }

    #[test]
    fn test_cpu_node_label() {
        let node = GraphNode::Cpu(CpuNode {
            task: CpuTask::new("RunTask", 0.0, 10.0),
        });
        assert_eq!(node.label(), "RunTask@0us");
        assert!(node.as_network().is_none());
        assert_eq!(NodeId(3).to_string(), "#3");
    }
}
