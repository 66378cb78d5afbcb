use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::run_model::{FetcherFailureSummary, PerformanceRecord, RunRecord};
use crate::cadence::Cadence;
use crate::errors::Result;

#[async_trait]
pub trait RunRecordRepositoryTrait: Send + Sync {
    /// Writes the run record and its timing in one transaction. Fails with a
    /// unique violation when (run_at, fetcher) is already recorded.
    async fn record_invocation(&self, run: RunRecord, performance: PerformanceRecord) -> Result<()>;

    /// Records of the most recent run of `cadence`, in fetcher order.
    fn latest_run_records(&self, cadence: Cadence) -> Result<Vec<RunRecord>>;

    /// Records of `cadence` with `run_at >= since`, oldest first.
    fn run_records_since(&self, cadence: Cadence, since: DateTime<Utc>) -> Result<Vec<RunRecord>>;

    /// Latest failure of every fetcher that ever failed.
    fn last_failures(&self) -> Result<Vec<FetcherFailureSummary>>;

    fn performance_for_run(&self, run_id: &str) -> Result<Vec<PerformanceRecord>>;
}
