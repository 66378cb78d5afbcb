//! Observation domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::identifiers::{validate_column_name, FamilyName};
use crate::errors::{Result, ValidationError};

/// One timestamped data point within a family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub family: FamilyName,
    pub column: String,
    pub value: f64,
}

/// One row of a wide family table. Columns missing from `values` or mapped
/// to `None` are null in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRow {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, Option<f64>>,
}

impl ObservationRow {
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }

    /// Flattens the non-null cells into long-form observations.
    pub fn observations(&self, family: &FamilyName) -> Vec<Observation> {
        self.values
            .iter()
            .filter_map(|(column, value)| {
                value.map(|v| Observation {
                    timestamp: self.timestamp,
                    family: family.clone(),
                    column: column.clone(),
                    value: v,
                })
            })
            .collect()
    }
}

/// A row to append to a family table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewObservationRow {
    pub family: FamilyName,
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

impl NewObservationRow {
    /// Builds a row, rejecting invalid column names and non-finite values.
    pub fn new(
        family: FamilyName,
        timestamp: DateTime<Utc>,
        values: BTreeMap<String, f64>,
    ) -> Result<Self> {
        for (column, value) in &values {
            validate_column_name(column)?;
            if !value.is_finite() {
                return Err(ValidationError::InvalidInput(format!(
                    "non-finite value {} for column '{}'",
                    value, column
                ))
                .into());
            }
        }
        Ok(Self {
            family,
            timestamp,
            values,
        })
    }
}

/// Most recent non-null value of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}
