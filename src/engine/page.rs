//! Page-load model

use crate::graph::{DependencyGraph, GraphBuilder, NodeId};
use crate::network::{NetworkAnalysis, NetworkLog, NetworkRecorder, NetworkRequestRecord};
use crate::trace::{ProcessedTrace, Trace};
use crate::utils::Result;

/// Everything derived from one recorded page load
///
/// Immutable once built; every metric reads the same model.
#[derive(Debug, Clone)]
pub struct PageModel {
    records: Vec<NetworkRequestRecord>,
    trace: ProcessedTrace,
    graph: DependencyGraph,
    analysis: NetworkAnalysis,
}

impl PageModel {
    /// Build the model from a raw trace and network log
    pub fn build(trace: &Trace, log: &NetworkLog, builder: &GraphBuilder) -> Result<Self> {
        let records = NetworkRecorder::records_from_log(log)?;
        let trace = ProcessedTrace::new(trace)?;
        Self::from_records(records, trace, builder)
    }

    /// Build the model from already normalized inputs
    pub fn from_records(
        records: Vec<NetworkRequestRecord>,
        trace: ProcessedTrace,
        builder: &GraphBuilder,
    ) -> Result<Self> {
        let graph = builder.build(&records, &trace)?;
        let analysis = NetworkAnalysis::analyze(&records);
        log::debug!(
            "page model: {} record(s), {} task(s), {} node(s)",
            records.len(),
            trace.tasks.len(),
            graph.len()
        );
        Ok(Self {
            records,
            trace,
            graph,
            analysis,
        })
    }

    /// Get the normalized request records
    pub fn records(&self) -> &[NetworkRequestRecord] {
        &self.records
    }

    /// Get the processed trace
    pub fn trace(&self) -> &ProcessedTrace {
        &self.trace
    }

    /// Get the dependency graph
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Get the network analysis
    pub fn analysis(&self) -> &NetworkAnalysis {
        &self.analysis
    }

    /// Graph node of the main document
    pub fn main_document(&self) -> Option<NodeId> {
        self.graph.find_network(|n| n.is_main_document)
    }
}
