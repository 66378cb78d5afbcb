mod model;
mod repository;
mod sql;


pub use model::*;
pub use repository::ObservationRepository;
