//! Run ledger: one record per fetcher invocation, plus timing.

mod run_model;
mod run_recorder;
mod run_traits;

#[cfg(test)]
mod run_recorder_tests;

pub use run_model::*;
pub use run_recorder::*;
pub use run_traits::*;
