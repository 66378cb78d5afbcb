//! Fetcher unit contract.
//!
//! A fetcher is a named unit of work that appends observations for its own
//! family or fails with a [`FetchFailure`]. The pipeline never inspects what
//! a fetcher wrote, only whether the call succeeded.

mod command_fetcher;
mod fetcher_model;
mod fetcher_traits;

pub use command_fetcher::*;
pub use fetcher_model::*;
pub use fetcher_traits::*;
