use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::history_model::HistorySnapshot;
use crate::errors::Result;

/// Persistence for history snapshots. The aggregator is the only writer.
#[async_trait]
pub trait HistoryRepositoryTrait: Send + Sync {
    /// Writes the snapshot, replacing the row with the same timestamp if any.
    async fn upsert_snapshot(&self, snapshot: HistorySnapshot) -> Result<()>;

    fn get_snapshot(&self, timestamp: DateTime<Utc>) -> Result<Option<HistorySnapshot>>;

    /// Snapshots in `[from, to]`, oldest first.
    fn list_snapshots(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistorySnapshot>>;

    /// Latest snapshot strictly before `before`.
    fn latest_snapshot_before(&self, before: DateTime<Utc>) -> Result<Option<HistorySnapshot>>;

    fn latest_snapshot(&self) -> Result<Option<HistorySnapshot>>;
}
