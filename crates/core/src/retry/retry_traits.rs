use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;

/// External check that daily data is stale.
///
/// Must be idempotent: asking twice for the same period gives the same
/// answer unless data changed in between.
#[async_trait]
pub trait DailyProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn needs_run(&self, period_start: DateTime<Utc>) -> Result<bool>;
}
