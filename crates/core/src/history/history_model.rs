use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result, ValidationError};
use crate::observations::FamilyName;

/// Input fields of a history snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryField {
    TotalLiquid,
    TotalRealEstate,
    TotalRetirement,
    TotalInvesting,
    Etfs,
    Commodities,
    Ira,
    Pillar2,
}

impl HistoryField {
    pub const ALL: [HistoryField; 8] = [
        HistoryField::TotalLiquid,
        HistoryField::TotalRealEstate,
        HistoryField::TotalRetirement,
        HistoryField::TotalInvesting,
        HistoryField::Etfs,
        HistoryField::Commodities,
        HistoryField::Ira,
        HistoryField::Pillar2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryField::TotalLiquid => "total_liquid",
            HistoryField::TotalRealEstate => "total_real_estate",
            HistoryField::TotalRetirement => "total_retirement",
            HistoryField::TotalInvesting => "total_investing",
            HistoryField::Etfs => "etfs",
            HistoryField::Commodities => "commodities",
            HistoryField::Ira => "ira",
            HistoryField::Pillar2 => "pillar2",
        }
    }
}

impl fmt::Display for HistoryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        HistoryField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidInput(format!("unknown history field '{}'", s)).into())
    }
}

/// Directly sourced snapshot values. `None` means unknown, never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryInputs {
    pub total_liquid: Option<f64>,
    pub total_real_estate: Option<f64>,
    pub total_retirement: Option<f64>,
    pub total_investing: Option<f64>,
    pub etfs: Option<f64>,
    pub commodities: Option<f64>,
    pub ira: Option<f64>,
    pub pillar2: Option<f64>,
}

impl HistoryInputs {
    pub fn get(&self, field: HistoryField) -> Option<f64> {
        match field {
            HistoryField::TotalLiquid => self.total_liquid,
            HistoryField::TotalRealEstate => self.total_real_estate,
            HistoryField::TotalRetirement => self.total_retirement,
            HistoryField::TotalInvesting => self.total_investing,
            HistoryField::Etfs => self.etfs,
            HistoryField::Commodities => self.commodities,
            HistoryField::Ira => self.ira,
            HistoryField::Pillar2 => self.pillar2,
        }
    }

    pub fn set(&mut self, field: HistoryField, value: Option<f64>) {
        let slot = match field {
            HistoryField::TotalLiquid => &mut self.total_liquid,
            HistoryField::TotalRealEstate => &mut self.total_real_estate,
            HistoryField::TotalRetirement => &mut self.total_retirement,
            HistoryField::TotalInvesting => &mut self.total_investing,
            HistoryField::Etfs => &mut self.etfs,
            HistoryField::Commodities => &mut self.commodities,
            HistoryField::Ira => &mut self.ira,
            HistoryField::Pillar2 => &mut self.pillar2,
        };
        *slot = value;
    }
}

/// One consolidated history row.
///
/// The totals are derived in the constructor and have no setters:
/// `total_no_homes = total_liquid + total_retirement + total_investing` and
/// `total = total_no_homes + total_real_estate`, null if any term is null.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    inputs: HistoryInputs,
    total_no_homes: Option<f64>,
    total: Option<f64>,
}

impl HistorySnapshot {
    pub fn new(timestamp: DateTime<Utc>, inputs: HistoryInputs) -> Self {
        let total_no_homes = match (inputs.total_liquid, inputs.total_retirement, inputs.total_investing) {
            (Some(liquid), Some(retirement), Some(investing)) => Some(liquid + retirement + investing),
            _ => None,
        };
        let total = match (total_no_homes, inputs.total_real_estate) {
            (Some(no_homes), Some(real_estate)) => Some(no_homes + real_estate),
            _ => None,
        };
        Self {
            timestamp,
            inputs,
            total_no_homes,
            total,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn inputs(&self) -> &HistoryInputs {
        &self.inputs
    }

    pub fn get(&self, field: HistoryField) -> Option<f64> {
        self.inputs.get(field)
    }

    pub fn total_no_homes(&self) -> Option<f64> {
        self.total_no_homes
    }

    pub fn total(&self) -> Option<f64> {
        self.total
    }

    /// Every value by column name, inputs first then the two totals.
    pub fn values(&self) -> Vec<(&'static str, Option<f64>)> {
        let mut values: Vec<_> = HistoryField::ALL
            .iter()
            .map(|f| (f.as_str(), self.inputs.get(*f)))
            .collect();
        values.push(("total_no_homes", self.total_no_homes));
        values.push(("total", self.total));
        values
    }
}

/// Where one snapshot field comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSource {
    /// Latest non-null value of one column.
    Column { family: FamilyName, column: String },
    /// Sum of several columns of the family's latest row. Null if any is null.
    Sum { family: FamilyName, columns: Vec<String> },
    /// Sum of the latest complete valuation of every property.
    RealEstate,
}

pub type HistoryMapping = BTreeMap<HistoryField, FieldSource>;

/// Why a snapshot field could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InsufficientData {
    /// No source is configured for the field.
    Unmapped,
    UnknownFamily { family: String },
    MissingColumn { family: String, column: String },
    /// No observation at or before the snapshot's as-of time.
    NoObservation,
    /// Some properties have no valuation observed by both sites.
    InsufficientSources { properties: Vec<String> },
}

impl fmt::Display for InsufficientData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsufficientData::Unmapped => write!(f, "no source configured"),
            InsufficientData::UnknownFamily { family } => write!(f, "unknown family '{}'", family),
            InsufficientData::MissingColumn { family, column } => {
                write!(f, "family '{}' has no column '{}'", family, column)
            }
            InsufficientData::NoObservation => write!(f, "no observation"),
            InsufficientData::InsufficientSources { properties } => {
                write!(f, "single-source valuations for {}", properties.join(", "))
            }
        }
    }
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationReport {
    pub snapshot: HistorySnapshot,
    pub missing: Vec<(HistoryField, InsufficientData)>,
}

impl AggregationReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Movement between the last snapshot before today and the latest one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotChange {
    pub baseline: Option<HistorySnapshot>,
    pub latest: HistorySnapshot,
    /// Per column; `None` when either side is unknown.
    pub deltas: Vec<(&'static str, Option<f64>)>,
}

impl SnapshotChange {
    pub fn between(baseline: Option<HistorySnapshot>, latest: HistorySnapshot) -> Self {
        let deltas = latest
            .values()
            .into_iter()
            .map(|(name, current)| {
                let before = baseline
                    .as_ref()
                    .and_then(|b| b.values().into_iter().find(|(n, _)| *n == name))
                    .and_then(|(_, v)| v);
                let delta = match (current, before) {
                    (Some(now), Some(then)) => Some(now - then),
                    _ => None,
                };
                (name, delta)
            })
            .collect();
        Self {
            baseline,
            latest,
            deltas,
        }
    }
}
