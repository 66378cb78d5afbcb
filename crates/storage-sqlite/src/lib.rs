//! SQLite storage for the networth pipeline.
//!
//! Implements the repository traits defined in `networth-core`:
//! - connection pooling and the single writer actor
//! - embedded Diesel migrations for the fixed tables
//! - runtime-created wide tables for observation families
//!
//! This crate is the only place where Diesel dependencies exist.

pub mod db;
pub mod errors;
pub mod schema;

// Repository implementations
pub mod history;
pub mod observations;
pub mod real_estate;
pub mod runs;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, get_db_path, has_pending_migrations, init, run_migrations,
    spawn_writer, Database, DbConnection, DbPool, WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

pub use history::HistoryRepository;
pub use observations::ObservationRepository;
pub use real_estate::RealEstateRepository;
pub use runs::RunRecordRepository;

// Re-export from networth-core for convenience
pub use networth_core::errors::{DatabaseError, Error, Result};
