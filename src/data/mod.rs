pub mod cache;
pub mod persistence;
pub mod sources;
pub mod types;
