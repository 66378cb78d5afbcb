use chrono::{DateTime, SubsecRound, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use log::{debug, error, info, warn};
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::cadence_model::{AggregationStatus, CadencePlan, FetcherResult, RunOutcome};
use super::dir_lock::DataDirLock;
use crate::constants::{DEFAULT_LOCK_POLL_MS, DEFAULT_LOCK_TIMEOUT_SECS};
use crate::errors::Result;
use crate::fetchers::{FetchContext, FetchFailure, FetchFailureKind, FetcherUnit};
use crate::history::HistoryAggregator;
use crate::runs::{RunRecordRepositoryTrait, RunRecorder};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub lock_timeout: Duration,
    pub lock_poll_interval: Duration,
    /// Fetchers invoked at once. 1 runs them strictly in sequence.
    pub max_concurrency: usize,
    /// Calendar used for period boundaries.
    pub timezone: Tz,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            lock_poll_interval: Duration::from_millis(DEFAULT_LOCK_POLL_MS),
            max_concurrency: 1,
            timezone: Tz::UTC,
        }
    }
}

/// Runs a cadence's fetchers under the data-directory lock.
pub struct CadenceOrchestrator {
    lock: DataDirLock,
    recorder: RunRecorder,
    runs: Arc<dyn RunRecordRepositoryTrait>,
    aggregator: Option<Arc<HistoryAggregator>>,
    settings: OrchestratorSettings,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "fetcher panicked".to_string()
    }
}

impl CadenceOrchestrator {
    pub fn new(lock: DataDirLock, runs: Arc<dyn RunRecordRepositoryTrait>, settings: OrchestratorSettings) -> Self {
        Self {
            lock,
            recorder: RunRecorder::new(runs.clone()),
            runs,
            aggregator: None,
            settings,
        }
    }

    pub fn with_aggregator(mut self, aggregator: Arc<HistoryAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Runs the plan now.
    ///
    /// Fails only with `LockContention` (or a lock I/O error). Fetcher
    /// failures are reported in the outcome.
    pub async fn run_cadence(&self, plan: &CadencePlan) -> Result<RunOutcome> {
        self.run_cadence_at(plan, Utc::now()).await
    }

    /// Runs the plan with an explicit run timestamp.
    pub async fn run_cadence_at(&self, plan: &CadencePlan, run_at: DateTime<Utc>) -> Result<RunOutcome> {
        let _guard = self
            .lock
            .acquire(self.settings.lock_timeout, self.settings.lock_poll_interval)
            .await?;

        // Stored timestamps carry microseconds.
        let ctx = FetchContext::new(plan.cadence, run_at.trunc_subsecs(6));
        info!(
            "Starting {} run {} with {} fetchers",
            plan.cadence,
            ctx.run_id,
            plan.fetchers.len()
        );

        let (due, skipped) = self.due_fetchers(plan, &ctx);
        let results = self.invoke_all(&ctx, due).await;
        let aggregation = self.aggregate(plan, &ctx).await;

        let outcome = RunOutcome {
            run_id: ctx.run_id.clone(),
            cadence: plan.cadence,
            run_at: ctx.run_at,
            finished_at: Utc::now(),
            results,
            skipped,
            aggregation,
        };
        if outcome.is_success() {
            info!("{}", outcome.summary());
        } else {
            warn!("{}", outcome.summary());
        }
        Ok(outcome)
    }

    /// Splits the plan's fetchers into those to invoke and those already
    /// successful in this period.
    fn due_fetchers(&self, plan: &CadencePlan, ctx: &FetchContext) -> (Vec<Arc<dyn FetcherUnit>>, Vec<String>) {
        if !plan.skip_succeeded_in_period {
            return (plan.fetchers.clone(), Vec::new());
        }
        let period_start = plan.cadence.period_start(ctx.run_at, &self.settings.timezone);
        let succeeded: HashSet<String> = match self.runs.run_records_since(plan.cadence, period_start) {
            Ok(records) => records
                .into_iter()
                .filter(|r| r.success)
                .map(|r| r.fetcher)
                .collect(),
            Err(e) => {
                warn!("Could not read run ledger, running every fetcher: {}", e);
                HashSet::new()
            }
        };

        let mut due = Vec::new();
        let mut skipped = Vec::new();
        for fetcher in &plan.fetchers {
            if succeeded.contains(fetcher.name()) {
                debug!("Skipping {}: already succeeded since {}", fetcher.name(), period_start);
                skipped.push(fetcher.name().to_string());
            } else {
                due.push(fetcher.clone());
            }
        }
        (due, skipped)
    }

    async fn invoke_all(&self, ctx: &FetchContext, fetchers: Vec<Arc<dyn FetcherUnit>>) -> Vec<FetcherResult> {
        let concurrency = self.settings.max_concurrency.max(1);
        stream::iter(fetchers)
            .map(|fetcher| self.invoke_one(ctx, fetcher))
            .buffered(concurrency)
            .collect()
            .await
    }

    async fn invoke_one(&self, ctx: &FetchContext, fetcher: Arc<dyn FetcherUnit>) -> FetcherResult {
        let name = fetcher.name().to_string();
        let limit = fetcher.timeout();
        let started = Instant::now();
        debug!("Invoking {}", name);

        let call = AssertUnwindSafe(async {
            fetcher.prepare().await?;
            fetcher.invoke(ctx).await
        })
        .catch_unwind();
        let outcome = match tokio::time::timeout(limit, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(FetchFailure::new(
                FetchFailureKind::Panic,
                panic_message(payload.as_ref()),
            )),
            Err(_) => Err(FetchFailure::timeout(limit)),
        };
        let elapsed = started.elapsed();

        match &outcome {
            Ok(()) => info!("{} succeeded in {:.2}s", name, elapsed.as_secs_f64()),
            Err(failure) => error!("{} failed after {:.2}s: {}", name, elapsed.as_secs_f64(), failure),
        }

        let record_status = self.recorder.record(ctx, &name, &outcome, elapsed).await;
        FetcherResult {
            name,
            outcome,
            elapsed,
            record_status,
        }
    }

    async fn aggregate(&self, plan: &CadencePlan, ctx: &FetchContext) -> AggregationStatus {
        if !plan.aggregate_history {
            return AggregationStatus::NotRun;
        }
        let Some(aggregator) = &self.aggregator else {
            warn!("{} plan asks for history but no aggregator is configured", plan.cadence);
            return AggregationStatus::NotRun;
        };
        let snapshot_at = plan.cadence.period_start(ctx.run_at, &self.settings.timezone);
        match aggregator.aggregate(ctx.run_at, snapshot_at).await {
            Ok(report) => AggregationStatus::Completed(report),
            Err(e) => {
                error!("History aggregation for run {} failed: {}", ctx.run_id, e);
                AggregationStatus::Failed(e.to_string())
            }
        }
    }
}
