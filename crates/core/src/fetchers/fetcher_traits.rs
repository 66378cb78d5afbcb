use async_trait::async_trait;
use std::time::Duration;

use super::fetcher_model::{FetchContext, FetchFailure};
use crate::constants::DEFAULT_FETCHER_TIMEOUT_SECS;

/// A named, independently invokable unit of collection work.
///
/// Writing observations is the fetcher's own responsibility. Implementations
/// must be cancel-safe: the orchestrator drops the future when `timeout()`
/// elapses.
#[async_trait]
pub trait FetcherUnit: Send + Sync {
    fn name(&self) -> &str;

    /// Upper bound on one invocation.
    fn timeout(&self) -> Duration {
        Duration::from_secs(DEFAULT_FETCHER_TIMEOUT_SECS)
    }

    /// Creates or extends the tables this fetcher writes to. Called under
    /// the data directory lock, right before `invoke`.
    async fn prepare(&self) -> Result<(), FetchFailure> {
        Ok(())
    }

    async fn invoke(&self, ctx: &FetchContext) -> Result<(), FetchFailure>;
}
