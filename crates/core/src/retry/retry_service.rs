use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

use super::retry_model::{DailyRetry, HourlyReport, RetryDecision, RetryReason};
use super::retry_traits::DailyProbe;
use crate::cadence::{Cadence, CadenceOrchestrator, CadencePlan};
use crate::errors::Result;
use crate::runs::{RunRecord, RunRecordRepositoryTrait};

/// True when the latest daily run had a failure or the probe reports stale data.
pub fn needs_daily_run(latest_daily: &[RunRecord], probe_stale: bool) -> bool {
    latest_daily.iter().any(|r| !r.success) || probe_stale
}

/// Probe backed by the run ledger: stale when any expected daily fetcher
/// has no successful record since the start of the period.
pub struct RunLedgerProbe {
    runs: Arc<dyn RunRecordRepositoryTrait>,
    expected: Vec<String>,
}

impl RunLedgerProbe {
    pub fn new(runs: Arc<dyn RunRecordRepositoryTrait>, expected: Vec<String>) -> Self {
        Self { runs, expected }
    }
}

#[async_trait]
impl DailyProbe for RunLedgerProbe {
    fn name(&self) -> &str {
        "run_ledger"
    }

    async fn needs_run(&self, period_start: DateTime<Utc>) -> Result<bool> {
        let succeeded: HashSet<String> = self
            .runs
            .run_records_since(Cadence::Daily, period_start)?
            .into_iter()
            .filter(|r| r.success)
            .map(|r| r.fetcher)
            .collect();
        Ok(self.expected.iter().any(|name| !succeeded.contains(name)))
    }
}

pub struct RetryPlanner {
    runs: Arc<dyn RunRecordRepositoryTrait>,
    probe: Arc<dyn DailyProbe>,
    timezone: Tz,
}

impl RetryPlanner {
    pub fn new(runs: Arc<dyn RunRecordRepositoryTrait>, probe: Arc<dyn DailyProbe>, timezone: Tz) -> Self {
        Self { runs, probe, timezone }
    }

    /// Reads the run ledger and the probe. Never fails: anything unreadable
    /// counts as a reason to run.
    pub async fn evaluate(&self, now: DateTime<Utc>) -> RetryDecision {
        let mut reasons = Vec::new();

        match self.runs.latest_run_records(Cadence::Daily) {
            Ok(records) => {
                let failed: Vec<String> = records
                    .iter()
                    .filter(|r| !r.success)
                    .map(|r| r.fetcher.clone())
                    .collect();
                if needs_daily_run(&records, false) {
                    reasons.push(RetryReason::PreviousRunFailed { fetchers: failed });
                }
            }
            Err(e) => {
                warn!("Could not read daily run records: {}", e);
                reasons.push(RetryReason::LedgerUnavailable { error: e.to_string() });
            }
        }

        let period_start = Cadence::Daily.period_start(now, &self.timezone);
        match self.probe.needs_run(period_start).await {
            Ok(true) => reasons.push(RetryReason::ProbeReportedStale {
                probe: self.probe.name().to_string(),
            }),
            Ok(false) => {}
            Err(e) => {
                warn!("Probe {} failed: {}", self.probe.name(), e);
                reasons.push(RetryReason::ProbeFailed {
                    probe: self.probe.name().to_string(),
                    error: e.to_string(),
                });
            }
        }

        RetryDecision::from_reasons(reasons)
    }
}

/// Runs the hourly cadence, then the daily cadence out of band if the
/// planner asks for it. The daily run starts after the hourly run has
/// released the lock.
///
/// Fails only when the hourly run itself could not start.
pub async fn run_hourly_with_daily_retry(
    orchestrator: &CadenceOrchestrator,
    hourly: &CadencePlan,
    daily: &CadencePlan,
    planner: &RetryPlanner,
) -> Result<HourlyReport> {
    let hourly_outcome = orchestrator.run_cadence(hourly).await?;
    let decision = planner.evaluate(Utc::now()).await;

    let daily_retry = if decision.needs_run {
        info!("Triggering daily run: {:?}", decision.reasons);
        match orchestrator.run_cadence(daily).await {
            Ok(outcome) => DailyRetry::Ran(outcome),
            Err(e) => {
                warn!("Daily retry could not run: {}", e);
                DailyRetry::Failed(e.to_string())
            }
        }
    } else {
        DailyRetry::NotNeeded
    };

    Ok(HourlyReport {
        hourly: hourly_outcome,
        decision,
        daily_retry,
    })
}
