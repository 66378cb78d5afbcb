mod model;
mod repository;

#[cfg(test)]
mod repository_tests;

pub use model::*;
pub use repository::RunRecordRepository;
