//! Consolidated history snapshots and the aggregator that builds them.

mod history_model;
mod history_service;
mod history_traits;


pub use history_model::*;
pub use history_service::*;
pub use history_traits::*;
