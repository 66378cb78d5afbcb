//! Validated identifiers for family tables and their columns.
//!
//! Family names become SQL table names, so they are restricted to a safe
//! lowercase alphabet. Column names are free-form instrument labels
//! (`CHFUSD=X`, `^SSMI`) and are always quoted by the storage layer.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::TIMESTAMP_COLUMN;
use crate::errors::{Result, ValidationError};

lazy_static! {
    static ref FAMILY_NAME_RE: Regex = Regex::new(r"^[a-z][a-z0-9_]{0,62}$").unwrap();
}

/// Tables owned by the pipeline itself. Fetchers can never write into these.
pub const RESERVED_TABLES: &[&str] = &[
    "observation_families",
    "run_records",
    "performance_records",
    "history",
    "real_estate_prices",
];

const MAX_COLUMN_NAME_LEN: usize = 128;

/// Name of an observation family (one wide table).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FamilyName(String);

impl FamilyName {
    pub fn parse(name: &str) -> Result<Self> {
        if !FAMILY_NAME_RE.is_match(name) {
            return Err(ValidationError::InvalidFamilyName(name.to_string()).into());
        }
        if RESERVED_TABLES.contains(&name) || name.starts_with("sqlite_") || name.starts_with("__diesel") {
            return Err(ValidationError::ReservedFamilyName(name.to_string()).into());
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FamilyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FamilyName {
    type Error = crate::errors::Error;

    fn try_from(value: String) -> Result<Self> {
        FamilyName::parse(&value)
    }
}

impl From<FamilyName> for String {
    fn from(value: FamilyName) -> Self {
        value.0
    }
}

/// Checks that a column name can be stored in a family table.
pub fn validate_column_name(column: &str) -> Result<()> {
    let trimmed = column.trim();
    if trimmed.is_empty()
        || trimmed != column
        || column.len() > MAX_COLUMN_NAME_LEN
        || column.chars().any(char::is_control)
        || column.eq_ignore_ascii_case(TIMESTAMP_COLUMN)
    {
        return Err(ValidationError::InvalidColumnName(column.to_string()).into());
    }
    Ok(())
}
