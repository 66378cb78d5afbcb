//! In-memory repositories and scripted fetchers for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cadence::Cadence;
use crate::errors::{DatabaseError, Error, Result, ValidationError};
use crate::fetchers::{FetchContext, FetchFailure, FetcherUnit};
use crate::history::{HistoryRepositoryTrait, HistorySnapshot};
use crate::observations::{
    FamilyName, LatestValue, NewObservationRow, ObservationRepositoryTrait, ObservationRow,
};
use crate::real_estate::{AppraisalSite, NewAppraisal, RealEstateRepositoryTrait, RealEstateValuation};
use crate::runs::{FetcherFailureSummary, PerformanceRecord, RunRecord, RunRecordRepositoryTrait};

#[derive(Default)]
struct FamilyTable {
    columns: Vec<String>,
    rows: BTreeMap<DateTime<Utc>, BTreeMap<String, f64>>,
}

#[derive(Default)]
pub struct InMemoryObservations {
    families: Mutex<BTreeMap<FamilyName, FamilyTable>>,
}

impl InMemoryObservations {
    fn to_row(table: &FamilyTable, timestamp: DateTime<Utc>, values: &BTreeMap<String, f64>) -> ObservationRow {
        ObservationRow {
            timestamp,
            values: table
                .columns
                .iter()
                .map(|c| (c.clone(), values.get(c).copied()))
                .collect(),
        }
    }

    fn unknown(family: &FamilyName) -> Error {
        ValidationError::UnknownFamily(family.to_string()).into()
    }
}

#[async_trait]
impl ObservationRepositoryTrait for InMemoryObservations {
    async fn ensure_family(&self, family: &FamilyName, columns: &[String]) -> Result<()> {
        let mut families = self.families.lock().unwrap();
        let table = families.entry(family.clone()).or_default();
        for column in columns {
            if !table.columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                table.columns.push(column.clone());
            }
        }
        Ok(())
    }

    async fn add_column(&self, family: &FamilyName, column: &str) -> Result<bool> {
        let mut families = self.families.lock().unwrap();
        let table = families.get_mut(family).ok_or_else(|| Self::unknown(family))?;
        if table.columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            return Ok(false);
        }
        table.columns.push(column.to_string());
        Ok(true)
    }

    async fn append(&self, row: NewObservationRow) -> Result<()> {
        let mut families = self.families.lock().unwrap();
        let table = families
            .get_mut(&row.family)
            .ok_or_else(|| Self::unknown(&row.family))?;
        if let Some(column) = row.values.keys().find(|c| !table.columns.contains(*c)) {
            return Err(ValidationError::UnknownColumn {
                family: row.family.to_string(),
                column: column.clone(),
            }
            .into());
        }
        if table.rows.contains_key(&row.timestamp) {
            return Err(DatabaseError::UniqueViolation(format!("{}.date", row.family)).into());
        }
        table.rows.insert(row.timestamp, row.values);
        Ok(())
    }

    fn list_families(&self) -> Result<Vec<FamilyName>> {
        Ok(self.families.lock().unwrap().keys().cloned().collect())
    }

    fn list_columns(&self, family: &FamilyName) -> Result<Vec<String>> {
        let families = self.families.lock().unwrap();
        let table = families.get(family).ok_or_else(|| Self::unknown(family))?;
        Ok(table.columns.clone())
    }

    fn latest_row_as_of(&self, family: &FamilyName, as_of: DateTime<Utc>) -> Result<Option<ObservationRow>> {
        let families = self.families.lock().unwrap();
        let table = families.get(family).ok_or_else(|| Self::unknown(family))?;
        Ok(table
            .rows
            .range(..=as_of)
            .next_back()
            .map(|(ts, values)| Self::to_row(table, *ts, values)))
    }

    fn latest_value_as_of(
        &self,
        family: &FamilyName,
        column: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LatestValue>> {
        let families = self.families.lock().unwrap();
        let table = families.get(family).ok_or_else(|| Self::unknown(family))?;
        Ok(table.rows.range(..=as_of).rev().find_map(|(ts, values)| {
            values.get(column).map(|value| LatestValue {
                timestamp: *ts,
                value: *value,
            })
        }))
    }

    fn rows_between(
        &self,
        family: &FamilyName,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ObservationRow>> {
        let families = self.families.lock().unwrap();
        let table = families.get(family).ok_or_else(|| Self::unknown(family))?;
        Ok(table
            .rows
            .iter()
            .filter(|(ts, _)| from.map_or(true, |f| **ts >= f) && to.map_or(true, |t| **ts <= t))
            .map(|(ts, values)| Self::to_row(table, *ts, values))
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryRealEstate {
    appraisals: Mutex<BTreeMap<(DateTime<Utc>, String, AppraisalSite), f64>>,
}

#[async_trait]
impl RealEstateRepositoryTrait for InMemoryRealEstate {
    async fn append_appraisals(&self, batch: Vec<NewAppraisal>) -> Result<()> {
        let mut appraisals = self.appraisals.lock().unwrap();
        let mut staged = BTreeMap::new();
        for appraisal in batch {
            let key = (appraisal.timestamp, appraisal.property.clone(), appraisal.site);
            if appraisals.contains_key(&key) || staged.insert(key, appraisal.value).is_some() {
                return Err(DatabaseError::UniqueViolation("real_estate_prices".to_string()).into());
            }
        }
        appraisals.extend(staged);
        Ok(())
    }

    fn list_valuations(&self, up_to: Option<DateTime<Utc>>) -> Result<Vec<RealEstateValuation>> {
        let appraisals = self.appraisals.lock().unwrap();
        let mut grouped: BTreeMap<(DateTime<Utc>, String), (Option<f64>, Option<f64>)> = BTreeMap::new();
        for ((ts, property, site), value) in appraisals.iter() {
            if up_to.is_some_and(|limit| *ts > limit) {
                continue;
            }
            let entry = grouped.entry((*ts, property.clone())).or_default();
            match site {
                AppraisalSite::Redfin => entry.0 = Some(*value),
                AppraisalSite::Zillow => entry.1 = Some(*value),
            }
        }
        Ok(grouped
            .into_iter()
            .map(|((ts, property), (redfin, zillow))| RealEstateValuation::new(ts, property, redfin, zillow))
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryRuns {
    records: Mutex<Vec<(RunRecord, PerformanceRecord)>>,
    fail_writes: AtomicBool,
}

impl InMemoryRuns {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn all_records(&self) -> Vec<RunRecord> {
        self.records.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }
}

#[async_trait]
impl RunRecordRepositoryTrait for InMemoryRuns {
    async fn record_invocation(&self, run: RunRecord, performance: PerformanceRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryFailed("database is locked".to_string()).into());
        }
        let mut records = self.records.lock().unwrap();
        if records
            .iter()
            .any(|(r, _)| r.run_at == run.run_at && r.fetcher == run.fetcher)
        {
            return Err(DatabaseError::UniqueViolation("run_records".to_string()).into());
        }
        records.push((run, performance));
        Ok(())
    }

    fn latest_run_records(&self, cadence: Cadence) -> Result<Vec<RunRecord>> {
        let records = self.all_records();
        let latest = records
            .iter()
            .filter(|r| r.cadence == cadence)
            .map(|r| r.run_at)
            .max();
        Ok(records
            .into_iter()
            .filter(|r| r.cadence == cadence && Some(r.run_at) == latest)
            .collect())
    }

    fn run_records_since(&self, cadence: Cadence, since: DateTime<Utc>) -> Result<Vec<RunRecord>> {
        Ok(self
            .all_records()
            .into_iter()
            .filter(|r| r.cadence == cadence && r.run_at >= since)
            .collect())
    }

    fn last_failures(&self) -> Result<Vec<FetcherFailureSummary>> {
        let mut by_fetcher: BTreeMap<String, FetcherFailureSummary> = BTreeMap::new();
        let records = self.all_records();
        for record in records.iter().filter(|r| !r.success) {
            let newer = by_fetcher
                .get(&record.fetcher)
                .map_or(true, |s| record.run_at > s.failed_at);
            if newer {
                by_fetcher.insert(
                    record.fetcher.clone(),
                    FetcherFailureSummary {
                        fetcher: record.fetcher.clone(),
                        cadence: record.cadence,
                        failed_at: record.run_at,
                        error: record.error.clone().unwrap_or_default(),
                        error_kind: record.error_kind,
                        last_success_at: None,
                    },
                );
            }
        }
        for summary in by_fetcher.values_mut() {
            summary.last_success_at = records
                .iter()
                .filter(|r| r.success && r.fetcher == summary.fetcher)
                .map(|r| r.run_at)
                .max();
        }
        Ok(by_fetcher.into_values().collect())
    }

    fn performance_for_run(&self, run_id: &str) -> Result<Vec<PerformanceRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.run_id == run_id)
            .map(|(_, p)| p.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryHistory {
    snapshots: Mutex<BTreeMap<DateTime<Utc>, HistorySnapshot>>,
    fail_writes: AtomicBool,
}

impl InMemoryHistory {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }
}

#[async_trait]
impl HistoryRepositoryTrait for InMemoryHistory {
    async fn upsert_snapshot(&self, snapshot: HistorySnapshot) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryFailed("disk I/O error".to_string()).into());
        }
        self.snapshots.lock().unwrap().insert(snapshot.timestamp(), snapshot);
        Ok(())
    }

    fn get_snapshot(&self, timestamp: DateTime<Utc>) -> Result<Option<HistorySnapshot>> {
        Ok(self.snapshots.lock().unwrap().get(&timestamp).cloned())
    }

    fn list_snapshots(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistorySnapshot>> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .values()
            .filter(|s| from.map_or(true, |f| s.timestamp() >= f) && to.map_or(true, |t| s.timestamp() <= t))
            .cloned()
            .collect())
    }

    fn latest_snapshot_before(&self, before: DateTime<Utc>) -> Result<Option<HistorySnapshot>> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .range(..before)
            .next_back()
            .map(|(_, s)| s.clone()))
    }

    fn latest_snapshot(&self) -> Result<Option<HistorySnapshot>> {
        Ok(self.snapshots.lock().unwrap().values().next_back().cloned())
    }
}

/// What a scripted fetcher does when invoked.
#[derive(Clone)]
pub enum Script {
    Succeed,
    Fail(FetchFailure),
    Sleep(Duration),
    Panic,
    /// Appends `{column: value}` to a family at the run timestamp.
    Write {
        store: Arc<InMemoryObservations>,
        family: FamilyName,
        values: BTreeMap<String, f64>,
    },
}

pub struct ScriptedFetcher {
    name: String,
    script: Script,
    timeout: Duration,
    calls: AtomicUsize,
    /// Shared log of invocation order across fetchers.
    order: Option<Arc<Mutex<Vec<String>>>>,
    /// Set while this fetcher runs, to detect overlapping runs.
    in_flight: Option<Arc<Mutex<HashSet<String>>>>,
}

impl ScriptedFetcher {
    pub fn new(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            timeout: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
            order: None,
            in_flight: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_order_log(mut self, order: Arc<Mutex<Vec<String>>>) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_in_flight(mut self, in_flight: Arc<Mutex<HashSet<String>>>) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetcherUnit for ScriptedFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn invoke(&self, ctx: &FetchContext) -> std::result::Result<(), FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(order) = &self.order {
            order.lock().unwrap().push(self.name.clone());
        }
        if let Some(in_flight) = &self.in_flight {
            let mut running = in_flight.lock().unwrap();
            assert!(running.is_empty(), "{} overlapped with {:?}", self.name, running);
            running.insert(self.name.clone());
        }
        let result = match &self.script {
            Script::Succeed => Ok(()),
            Script::Fail(failure) => Err(failure.clone()),
            Script::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(())
            }
            Script::Panic => panic!("scraper crashed"),
            Script::Write { store, family, values } => {
                let row = NewObservationRow::new(family.clone(), ctx.run_at, values.clone())?;
                store.append(row).await.map_err(FetchFailure::from)
            }
        };
        if let Some(in_flight) = &self.in_flight {
            in_flight.lock().unwrap().remove(&self.name);
        }
        result
    }
}
