use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::cadence::Cadence;
use crate::constants::UNKNOWN_FAILURE;
use crate::errors::{Error, ValidationError};

/// Broad category of a fetcher failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    Network,
    Parse,
    Auth,
    /// The remote source returned data in an unexpected shape, or the
    /// family table lacks a column for a new instrument.
    Schema,
    Timeout,
    Storage,
    Process,
    Panic,
    Other,
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchFailureKind::Network => "network error",
            FetchFailureKind::Parse => "parse error",
            FetchFailureKind::Auth => "authentication error",
            FetchFailureKind::Schema => "schema error",
            FetchFailureKind::Timeout => "timeout",
            FetchFailureKind::Storage => "storage error",
            FetchFailureKind::Process => "process error",
            FetchFailureKind::Panic => "panic",
            FetchFailureKind::Other => "error",
        };
        f.write_str(s)
    }
}

impl FetchFailureKind {
    /// Stored form, matching the serde name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchFailureKind::Network => "network",
            FetchFailureKind::Parse => "parse",
            FetchFailureKind::Auth => "auth",
            FetchFailureKind::Schema => "schema",
            FetchFailureKind::Timeout => "timeout",
            FetchFailureKind::Storage => "storage",
            FetchFailureKind::Process => "process",
            FetchFailureKind::Panic => "panic",
            FetchFailureKind::Other => "other",
        }
    }
}

impl std::str::FromStr for FetchFailureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(FetchFailureKind::Network),
            "parse" => Ok(FetchFailureKind::Parse),
            "auth" => Ok(FetchFailureKind::Auth),
            "schema" => Ok(FetchFailureKind::Schema),
            "timeout" => Ok(FetchFailureKind::Timeout),
            "storage" => Ok(FetchFailureKind::Storage),
            "process" => Ok(FetchFailureKind::Process),
            "panic" => Ok(FetchFailureKind::Panic),
            "other" => Ok(FetchFailureKind::Other),
            other => Err(ValidationError::InvalidInput(format!("unknown failure kind '{}'", other)).into()),
        }
    }
}

/// A single fetcher's failure. Local to that fetcher and never fatal to the run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {cause}")]
pub struct FetchFailure {
    pub kind: FetchFailureKind,
    pub cause: String,
}

impl FetchFailure {
    pub fn new(kind: FetchFailureKind, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        let cause = if cause.trim().is_empty() {
            UNKNOWN_FAILURE.to_string()
        } else {
            cause
        };
        Self { kind, cause }
    }

    pub fn network(cause: impl Into<String>) -> Self {
        Self::new(FetchFailureKind::Network, cause)
    }

    pub fn parse(cause: impl Into<String>) -> Self {
        Self::new(FetchFailureKind::Parse, cause)
    }

    pub fn auth(cause: impl Into<String>) -> Self {
        Self::new(FetchFailureKind::Auth, cause)
    }

    pub fn schema(cause: impl Into<String>) -> Self {
        Self::new(FetchFailureKind::Schema, cause)
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            FetchFailureKind::Timeout,
            format!("timed out after {:.1}s", limit.as_secs_f64()),
        )
    }

    pub fn other(cause: impl Into<String>) -> Self {
        Self::new(FetchFailureKind::Other, cause)
    }
}

/// Storage errors raised inside a fetcher become fetch failures of that fetcher.
impl From<Error> for FetchFailure {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Fetch(failure) => return failure.clone(),
            Error::Validation(ValidationError::UnknownColumn { .. })
            | Error::Validation(ValidationError::UnknownFamily(_)) => FetchFailureKind::Schema,
            Error::Validation(_) => FetchFailureKind::Parse,
            _ => FetchFailureKind::Storage,
        };
        FetchFailure::new(kind, err.to_string())
    }
}

/// Identity of the run a fetcher is invoked in.
///
/// Every fetcher in one run sees the same `run_at`, which is also the
/// timestamp its observations should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchContext {
    pub run_id: String,
    pub run_at: DateTime<Utc>,
    pub cadence: Cadence,
}

impl FetchContext {
    pub fn new(cadence: Cadence, run_at: DateTime<Utc>) -> Self {
        Self {
            run_id: uuid::Uuid::now_v7().to_string(),
            run_at,
            cadence,
        }
    }
}
