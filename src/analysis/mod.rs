pub mod estimator;
pub mod stats;
pub mod trend;
pub mod types;
