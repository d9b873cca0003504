pub mod aggregator;
pub mod alerts;
pub mod types;
pub mod validation;

use thiserror::Error;

/// Caller-visible failures. Source outages and cache IO faults are absorbed
/// below this level and never surface here; a total outage shows up as an
/// empty result or `InsufficientData`, not a crash.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}
