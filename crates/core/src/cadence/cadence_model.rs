use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{EXIT_RUN_FAILED, EXIT_SUCCESS};
use crate::errors::{Error, Result, ValidationError};
use crate::fetchers::{FetchFailure, FetcherUnit};
use crate::history::AggregationReport;
use crate::runs::RecordStatus;
use crate::utils::time_utils::{start_of_day, start_of_hour, start_of_week};

/// Schedule frequency a group of fetchers runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Hourly,
    Daily,
    Weekly,
}

impl Cadence {
    pub const ALL: [Cadence; 3] = [Cadence::Hourly, Cadence::Daily, Cadence::Weekly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Hourly => "hourly",
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
        }
    }

    /// Start of the scheduling period containing `at`.
    ///
    /// Snapshots and de-duplication are keyed by this instant, so two runs in
    /// the same period address the same rows.
    pub fn period_start(&self, at: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
        match self {
            Cadence::Hourly => start_of_hour(at, tz),
            Cadence::Daily => start_of_day(at, tz),
            Cadence::Weekly => start_of_week(at, tz),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Cadence::Hourly),
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            other => Err(ValidationError::InvalidInput(format!("unknown cadence '{}'", other)).into()),
        }
    }
}

/// What one cadence run should do.
#[derive(Clone)]
pub struct CadencePlan {
    pub cadence: Cadence,
    /// Invoked in this order; records keep this order too.
    pub fetchers: Vec<Arc<dyn FetcherUnit>>,
    /// Write one history snapshot after the fetchers, inside the lock.
    pub aggregate_history: bool,
    /// Skip fetchers that already have a successful record in the current period.
    pub skip_succeeded_in_period: bool,
}

impl CadencePlan {
    pub fn new(cadence: Cadence) -> Self {
        Self {
            cadence,
            fetchers: Vec::new(),
            aggregate_history: false,
            skip_succeeded_in_period: false,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn FetcherUnit>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    pub fn with_history(mut self, aggregate: bool) -> Self {
        self.aggregate_history = aggregate;
        self
    }

    pub fn with_period_dedup(mut self, skip: bool) -> Self {
        self.skip_succeeded_in_period = skip;
        self
    }

    pub fn fetcher_names(&self) -> Vec<String> {
        self.fetchers.iter().map(|f| f.name().to_string()).collect()
    }
}

impl fmt::Debug for CadencePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CadencePlan")
            .field("cadence", &self.cadence)
            .field("fetchers", &self.fetcher_names())
            .field("aggregate_history", &self.aggregate_history)
            .field("skip_succeeded_in_period", &self.skip_succeeded_in_period)
            .finish()
    }
}

/// Result of one fetcher invocation within a run.
#[derive(Debug, Clone)]
pub struct FetcherResult {
    pub name: String,
    pub outcome: std::result::Result<(), FetchFailure>,
    pub elapsed: Duration,
    pub record_status: RecordStatus,
}

impl FetcherResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone)]
pub enum AggregationStatus {
    NotRun,
    Completed(AggregationReport),
    Failed(String),
}

/// Aggregate outcome of one cadence run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub cadence: Cadence,
    pub run_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<FetcherResult>,
    /// Fetchers not invoked because they already succeeded in this period.
    pub skipped: Vec<String>,
    pub aggregation: AggregationStatus,
}

impl RunOutcome {
    /// True when every invoked fetcher succeeded and aggregation, if it ran,
    /// did not fail.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(FetcherResult::succeeded)
            && !matches!(self.aggregation, AggregationStatus::Failed(_))
    }

    pub fn failed_fetchers(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.name.clone())
            .collect()
    }

    /// Fetchers whose run record could not be written.
    pub fn unrecorded_fetchers(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| matches!(r.record_status, RecordStatus::WriteFailed(_)))
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            EXIT_SUCCESS
        } else {
            EXIT_RUN_FAILED
        }
    }

    pub fn summary(&self) -> String {
        let ok = self.results.iter().filter(|r| r.succeeded()).count();
        let mut summary = format!(
            "{} run {}: {}/{} fetchers succeeded",
            self.cadence,
            self.run_id,
            ok,
            self.results.len()
        );
        if !self.skipped.is_empty() {
            summary.push_str(&format!(", {} skipped", self.skipped.len()));
        }
        let failed = self.failed_fetchers();
        if !failed.is_empty() {
            summary.push_str(&format!(", failed: {}", failed.join(", ")));
        }
        match &self.aggregation {
            AggregationStatus::NotRun => {}
            AggregationStatus::Completed(report) => {
                summary.push_str(&format!(", history snapshot {}", report.snapshot.timestamp()));
                if !report.missing.is_empty() {
                    summary.push_str(&format!(" ({} fields unresolved)", report.missing.len()));
                }
            }
            AggregationStatus::Failed(err) => summary.push_str(&format!(", history failed: {}", err)),
        }
        summary
    }
}
