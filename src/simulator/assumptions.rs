//! Optimistic and pessimistic assumption sets
//!
//! Both estimates run the same simulator; they differ only in these flags.

use serde::{Deserialize, Serialize};

pub use crate::network::pool::ConnectionReuse;

/// Which bound an assumption set produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimate {
    Optimistic,
    Pessimistic,
}

impl Estimate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Estimate::Optimistic => "optimistic",
            Estimate::Pessimistic => "pessimistic",
        }
    }
}

/// Flags distinguishing the two bounding simulations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssumptionSet {
    pub estimate: Estimate,
    pub connection_reuse: ConnectionReuse,
    /// Every render-blocking request blocks paint, including ones scripts
    /// inserted; when false only parser-discovered ones do
    pub strict_render_blocking: bool,
}

impl AssumptionSet {
    pub fn optimistic() -> Self {
        Self {
            estimate: Estimate::Optimistic,
            connection_reuse: ConnectionReuse::Maximal,
            strict_render_blocking: false,
        }
    }

    pub fn pessimistic() -> Self {
        Self {
            estimate: Estimate::Pessimistic,
            connection_reuse: ConnectionReuse::Minimal,
            strict_render_blocking: true,
        }
    }

    pub fn for_estimate(estimate: Estimate) -> Self {
        match estimate {
            Estimate::Optimistic => Self::optimistic(),
            Estimate::Pessimistic => Self::pessimistic(),
        }
    }
}
