//! Observation store domain: wide per-family time-series tables.

mod identifiers;
mod observations_model;
mod observations_traits;

pub use identifiers::*;
pub use observations_model::*;
pub use observations_traits::*;
