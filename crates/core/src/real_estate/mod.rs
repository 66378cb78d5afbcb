//! Real-estate valuations from two independent appraisal sites.

mod real_estate_model;
mod real_estate_traits;

pub use real_estate_model::*;
pub use real_estate_traits::*;
