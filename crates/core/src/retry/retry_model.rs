use serde::Serialize;

use crate::cadence::RunOutcome;
use crate::constants::{EXIT_DAILY_RETRY_FAILED, EXIT_RUN_FAILED, EXIT_SUCCESS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RetryReason {
    /// The latest daily run had failing fetchers.
    PreviousRunFailed { fetchers: Vec<String> },
    ProbeReportedStale { probe: String },
    /// The probe could not answer; treated as stale.
    ProbeFailed { probe: String, error: String },
    /// The run ledger could not be read; treated as failed.
    LedgerUnavailable { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryDecision {
    pub needs_run: bool,
    pub reasons: Vec<RetryReason>,
}

impl RetryDecision {
    pub fn from_reasons(reasons: Vec<RetryReason>) -> Self {
        Self {
            needs_run: !reasons.is_empty(),
            reasons,
        }
    }
}

/// What happened to the out-of-band daily run.
#[derive(Debug, Clone)]
pub enum DailyRetry {
    NotNeeded,
    Ran(RunOutcome),
    /// The daily run could not start (usually lock contention).
    Failed(String),
}

impl DailyRetry {
    pub fn is_success(&self) -> bool {
        match self {
            DailyRetry::NotNeeded => true,
            DailyRetry::Ran(outcome) => outcome.is_success(),
            DailyRetry::Failed(_) => false,
        }
    }
}

/// Hourly run plus the daily retry it triggered.
///
/// The hourly status is primary; the daily retry only matters when the
/// hourly run itself succeeded.
#[derive(Debug, Clone)]
pub struct HourlyReport {
    pub hourly: RunOutcome,
    pub decision: RetryDecision,
    pub daily_retry: DailyRetry,
}

impl HourlyReport {
    pub fn exit_code(&self) -> i32 {
        if !self.hourly.is_success() {
            EXIT_RUN_FAILED
        } else if !self.daily_retry.is_success() {
            EXIT_DAILY_RETRY_FAILED
        } else {
            EXIT_SUCCESS
        }
    }
}
