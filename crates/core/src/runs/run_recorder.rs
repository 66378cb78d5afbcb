use log::{debug, error};
use std::sync::Arc;
use std::time::Duration;

use super::run_model::{PerformanceRecord, RunRecord};
use super::run_traits::RunRecordRepositoryTrait;
use crate::fetchers::{FetchContext, FetchFailure};

/// Whether the ledger write for one invocation went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Recorded,
    WriteFailed(String),
}

/// Appends run and performance records. Write failures are logged and
/// reported back as a value; they never change the fetcher's outcome.
#[derive(Clone)]
pub struct RunRecorder {
    repository: Arc<dyn RunRecordRepositoryTrait>,
}

impl RunRecorder {
    pub fn new(repository: Arc<dyn RunRecordRepositoryTrait>) -> Self {
        Self { repository }
    }

    pub async fn record(
        &self,
        ctx: &FetchContext,
        fetcher: &str,
        outcome: &std::result::Result<(), FetchFailure>,
        elapsed: Duration,
    ) -> RecordStatus {
        let run = RunRecord::from_outcome(ctx, fetcher, outcome);
        let performance = PerformanceRecord::new(ctx, fetcher, elapsed);
        match self.repository.record_invocation(run, performance).await {
            Ok(()) => {
                debug!(
                    "Recorded {} for run {} ({:.3}s, success={})",
                    fetcher,
                    ctx.run_id,
                    elapsed.as_secs_f64(),
                    outcome.is_ok()
                );
                RecordStatus::Recorded
            }
            Err(e) => {
                error!("Failed to record outcome of {} in run {}: {}", fetcher, ctx.run_id, e);
                RecordStatus::WriteFailed(e.to_string())
            }
        }
    }
}
