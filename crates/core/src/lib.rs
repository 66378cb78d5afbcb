//! Networth Core - domain types, services, and traits of the collection
//! pipeline.
//!
//! This crate is database-agnostic: it defines repository traits that are
//! implemented by the `storage-sqlite` crate, and the orchestration logic
//! that drives fetchers, records their outcomes, and aggregates history.

pub mod cadence;
pub mod config;
pub mod constants;
pub mod errors;
pub mod fetchers;
pub mod history;
pub mod observations;
pub mod real_estate;
pub mod retry;
pub mod runs;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
