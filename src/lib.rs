//! # Binix Lantern - Predictive Page-Load Simulator
//!
//! Estimates how fast a recorded page load would have been under different
//! network and CPU conditions, by replaying its dependency graph through a
//! simulated network and main thread.
//!
//! ## Architecture
//!
//! The simulator is organized into the following core modules:
//!
//! - **network**: Request records, network analysis, TCP and connection pool models
//! - **trace**: Trace events, main-thread tasks and paint markers
//! - **graph**: Page dependency graph and its builder
//! - **simulator**: Discrete-event simulation of a graph
//! - **metrics**: Metric strategies and the optimistic/pessimistic estimator
//! - **engine**: Pipeline from raw inputs to a metric report
//! - **cache**: Fingerprinted, shared results across concurrent callers
//! - **config**: Throttling and simulation settings
//! - **utils**: Shared utilities and error types

pub mod cache;
pub mod config;
pub mod engine;
pub mod graph;
pub mod metrics;
pub mod network;
pub mod simulator;
pub mod trace;
pub mod utils;

// Re-export main types for convenience
pub use cache::{Fingerprint, LanternContext, PageInputs};
pub use config::{LanternSettings, ThrottlingSettings};
pub use engine::{LanternEngine, PageModel};
pub use metrics::{LanternReport, Metric, MetricEstimate, MetricOutcome};
pub use utils::error::{LanternError, Result};

/// Simulator version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "Binix Lantern";
