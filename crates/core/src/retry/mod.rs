//! Decides whether an hourly run must re-trigger the daily cadence.

mod retry_model;
mod retry_service;
mod retry_traits;


pub use retry_model::*;
pub use retry_service::*;
pub use retry_traits::*;
