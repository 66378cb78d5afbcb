use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::history_model::{
    AggregationReport, FieldSource, HistoryField, HistoryInputs, HistoryMapping, HistorySnapshot,
    InsufficientData, SnapshotChange,
};
use super::history_traits::HistoryRepositoryTrait;
use crate::errors::{Error, Result, ValidationError};
use crate::observations::{FamilyName, ObservationRepositoryTrait};
use crate::real_estate::{RealEstateRepositoryTrait, RealEstateValuation};
use crate::utils::time_utils::start_of_day;

type Resolution = std::result::Result<f64, InsufficientData>;

/// Folds the latest value of each contributing family into one snapshot.
pub struct HistoryAggregator {
    observations: Arc<dyn ObservationRepositoryTrait>,
    real_estate: Arc<dyn RealEstateRepositoryTrait>,
    history: Arc<dyn HistoryRepositoryTrait>,
    mapping: HistoryMapping,
}

impl HistoryAggregator {
    pub fn new(
        observations: Arc<dyn ObservationRepositoryTrait>,
        real_estate: Arc<dyn RealEstateRepositoryTrait>,
        history: Arc<dyn HistoryRepositoryTrait>,
        mapping: HistoryMapping,
    ) -> Self {
        Self {
            observations,
            real_estate,
            history,
            mapping,
        }
    }

    pub fn mapping(&self) -> &HistoryMapping {
        &self.mapping
    }

    /// Builds the snapshot for `as_of` and writes it at `snapshot_at`,
    /// replacing any snapshot already stored there.
    pub async fn aggregate(
        &self,
        as_of: DateTime<Utc>,
        snapshot_at: DateTime<Utc>,
    ) -> Result<AggregationReport> {
        let report = self.compute(as_of, snapshot_at)?;
        self.history.upsert_snapshot(report.snapshot.clone()).await?;
        if report.is_complete() {
            info!("History snapshot {} written", snapshot_at);
        } else {
            warn!(
                "History snapshot {} written with {} unresolved fields",
                snapshot_at,
                report.missing.len()
            );
        }
        Ok(report)
    }

    /// Builds the snapshot without writing it.
    pub fn compute(&self, as_of: DateTime<Utc>, snapshot_at: DateTime<Utc>) -> Result<AggregationReport> {
        let mut inputs = HistoryInputs::default();
        let mut missing = Vec::new();

        for field in HistoryField::ALL {
            let resolution = match self.mapping.get(&field) {
                None => Err(InsufficientData::Unmapped),
                Some(source) => self.resolve(source, as_of)?,
            };
            match resolution {
                Ok(value) => inputs.set(field, Some(value)),
                Err(reason) => {
                    debug!("History field {} unresolved: {}", field, reason);
                    missing.push((field, reason));
                }
            }
        }

        Ok(AggregationReport {
            snapshot: HistorySnapshot::new(snapshot_at, inputs),
            missing,
        })
    }

    /// Compares the last snapshot before the start of `now`'s day with the
    /// latest snapshot. `None` when there is no snapshot at all.
    pub fn latest_change(&self, now: DateTime<Utc>, tz: &Tz) -> Result<Option<SnapshotChange>> {
        let Some(latest) = self.history.latest_snapshot()? else {
            return Ok(None);
        };
        let baseline = self.history.latest_snapshot_before(start_of_day(now, tz))?;
        Ok(Some(SnapshotChange::between(baseline, latest)))
    }

    fn resolve(&self, source: &FieldSource, as_of: DateTime<Utc>) -> Result<Resolution> {
        match source {
            FieldSource::Column { family, column } => self.resolve_column(family, column, as_of),
            FieldSource::Sum { family, columns } => self.resolve_sum(family, columns, as_of),
            FieldSource::RealEstate => self.resolve_real_estate(as_of),
        }
    }

    /// Lists the family's columns, turning an unknown family into a reason.
    fn family_columns(&self, family: &FamilyName) -> Result<std::result::Result<Vec<String>, InsufficientData>> {
        match self.observations.list_columns(family) {
            Ok(columns) => Ok(Ok(columns)),
            Err(Error::Validation(ValidationError::UnknownFamily(_))) => {
                Ok(Err(InsufficientData::UnknownFamily {
                    family: family.to_string(),
                }))
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_column(&self, family: &FamilyName, column: &str, as_of: DateTime<Utc>) -> Result<Resolution> {
        let columns = match self.family_columns(family)? {
            Ok(columns) => columns,
            Err(reason) => return Ok(Err(reason)),
        };
        if !columns.iter().any(|c| c == column) {
            return Ok(Err(InsufficientData::MissingColumn {
                family: family.to_string(),
                column: column.to_string(),
            }));
        }
        Ok(self
            .observations
            .latest_value_as_of(family, column, as_of)?
            .map(|latest| latest.value)
            .ok_or(InsufficientData::NoObservation))
    }

    fn resolve_sum(&self, family: &FamilyName, columns: &[String], as_of: DateTime<Utc>) -> Result<Resolution> {
        let known = match self.family_columns(family)? {
            Ok(known) => known,
            Err(reason) => return Ok(Err(reason)),
        };
        if let Some(column) = columns.iter().find(|c| !known.contains(*c)) {
            return Ok(Err(InsufficientData::MissingColumn {
                family: family.to_string(),
                column: column.clone(),
            }));
        }
        let Some(row) = self.observations.latest_row_as_of(family, as_of)? else {
            return Ok(Err(InsufficientData::NoObservation));
        };
        let mut total = 0.0;
        for column in columns {
            match row.value(column) {
                Some(value) => total += value,
                None => return Ok(Err(InsufficientData::NoObservation)),
            }
        }
        Ok(Ok(total))
    }

    fn resolve_real_estate(&self, as_of: DateTime<Utc>) -> Result<Resolution> {
        let valuations = self.real_estate.list_valuations(Some(as_of))?;
        Ok(total_real_estate(&valuations))
    }
}

/// Sums the latest complete valuation of every property. Any property with
/// no complete valuation makes the total unknown.
pub fn total_real_estate(valuations: &[RealEstateValuation]) -> Resolution {
    if valuations.is_empty() {
        return Err(InsufficientData::NoObservation);
    }

    let mut latest: BTreeMap<&str, &RealEstateValuation> = BTreeMap::new();
    let mut properties: BTreeSet<&str> = BTreeSet::new();
    for valuation in valuations {
        properties.insert(valuation.property.as_str());
        if !valuation.is_complete() {
            continue;
        }
        let newer = latest
            .get(valuation.property.as_str())
            .map_or(true, |current| valuation.timestamp > current.timestamp);
        if newer {
            latest.insert(valuation.property.as_str(), valuation);
        }
    }

    let incomplete: Vec<String> = properties
        .iter()
        .filter(|p| !latest.contains_key(*p))
        .map(|p| p.to_string())
        .collect();
    if !incomplete.is_empty() {
        return Err(InsufficientData::InsufficientSources { properties: incomplete });
    }

    Ok(latest.values().filter_map(|v| v.value()).sum())
}
