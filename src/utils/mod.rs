//! Shared utilities and error types

pub mod error;

pub use error::{LanternError, Result};

/// Microseconds per millisecond, the two time bases used by traces and the simulator
pub const US_PER_MS: f64 = 1000.0;

/// Median of a set of samples; `None` when empty
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
