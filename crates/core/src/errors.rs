//! Core error types for the networth pipeline.
//!
//! This module defines storage-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use chrono::ParseError as ChronoParseError;
use std::time::Duration;
use thiserror::Error;

use crate::fetchers::FetchFailure;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetcher failed: {0}")]
    Fetch(#[from] FetchFailure),

    /// Another cadence holds the data directory lock.
    #[error("Data directory lock {path} is held by another run (waited {waited:?})")]
    LockContention { path: String, waited: Duration },

    #[error("Data directory lock error: {0}")]
    Lock(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// True when the error means another run currently owns the data directory.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Error::LockContention { .. })
    }
}

/// Storage-agnostic error type for persistence operations.
///
/// All details are kept as strings so the storage layer can convert
/// Diesel/SQLite errors into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (e.g. a second row for the same timestamp).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A CHECK constraint was violated.
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// The single writer stopped accepting jobs.
    #[error("Database writer unavailable: {0}")]
    WriterUnavailable(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Validation errors for identifiers and user input.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid family name '{0}': expected lowercase letters, digits and '_'")]
    InvalidFamilyName(String),

    #[error("Family name '{0}' is reserved")]
    ReservedFamilyName(String),

    #[error("Invalid column name '{0}'")]
    InvalidColumnName(String),

    #[error("Unknown observation family '{0}'")]
    UnknownFamily(String),

    #[error("Unknown column '{column}' in family '{family}'")]
    UnknownColumn { family: String, column: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),
}

/// Errors raised while loading the pipeline definition.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse pipeline file: {0}")]
    Parse(String),

    #[error("Duplicate fetcher name '{0}'")]
    DuplicateFetcher(String),

    #[error("Fetcher '{0}' has an empty command")]
    EmptyCommand(String),

    /// Two fetchers write the same table.
    #[error("'{target}' is written by both '{owner}' and '{other}'")]
    SharedOutput {
        target: String,
        owner: String,
        other: String,
    },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
