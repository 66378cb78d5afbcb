//! Cadences, the data-directory lock and the orchestrator that runs a
//! cadence's fetchers under it.

mod cadence_model;
mod dir_lock;
mod orchestrator;


pub use cadence_model::*;
pub use dir_lock::*;
pub use orchestrator::*;
