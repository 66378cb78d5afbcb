use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cadence::Cadence;
use crate::constants::UNKNOWN_FAILURE;
use crate::fetchers::{FetchContext, FetchFailure, FetchFailureKind};

/// Outcome of one fetcher invocation. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub run_at: DateTime<Utc>,
    pub cadence: Cadence,
    pub fetcher: String,
    pub success: bool,
    /// Always non-empty when `success` is false.
    pub error: Option<String>,
    #[serde(default)]
    pub error_kind: Option<FetchFailureKind>,
}

impl RunRecord {
    pub fn new(
        run_id: impl Into<String>,
        run_at: DateTime<Utc>,
        cadence: Cadence,
        fetcher: impl Into<String>,
        success: bool,
        error: Option<String>,
    ) -> Self {
        let error = if success {
            None
        } else {
            Some(
                error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_FAILURE.to_string()),
            )
        };
        Self {
            run_id: run_id.into(),
            run_at,
            cadence,
            fetcher: fetcher.into(),
            success,
            error,
            error_kind: None,
        }
    }

    /// Tags a failed record with its category. Ignored on success.
    pub fn with_error_kind(mut self, kind: FetchFailureKind) -> Self {
        if !self.success {
            self.error_kind = Some(kind);
        }
        self
    }

    pub fn from_outcome(
        ctx: &FetchContext,
        fetcher: &str,
        outcome: &std::result::Result<(), FetchFailure>,
    ) -> Self {
        match outcome {
            Ok(()) => Self::new(ctx.run_id.clone(), ctx.run_at, ctx.cadence, fetcher, true, None),
            Err(failure) => Self::new(
                ctx.run_id.clone(),
                ctx.run_at,
                ctx.cadence,
                fetcher,
                false,
                Some(failure.cause.clone()),
            )
            .with_error_kind(failure.kind),
        }
    }
}

/// Wall-clock duration of one fetcher invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub run_id: String,
    pub run_at: DateTime<Utc>,
    pub cadence: Cadence,
    pub fetcher: String,
    pub elapsed_seconds: f64,
}

impl PerformanceRecord {
    pub fn new(ctx: &FetchContext, fetcher: &str, elapsed: Duration) -> Self {
        Self {
            run_id: ctx.run_id.clone(),
            run_at: ctx.run_at,
            cadence: ctx.cadence,
            fetcher: fetcher.to_string(),
            elapsed_seconds: elapsed.as_secs_f64(),
        }
    }
}

/// Most recent failure of one fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetcherFailureSummary {
    pub fetcher: String,
    pub cadence: Cadence,
    pub failed_at: DateTime<Utc>,
    pub error: String,
    pub error_kind: Option<FetchFailureKind>,
    /// Set when the fetcher has succeeded since that failure.
    pub last_success_at: Option<DateTime<Utc>>,
}

impl FetcherFailureSummary {
    pub fn is_resolved(&self) -> bool {
        self.last_success_at.is_some_and(|at| at > self.failed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_failed_record_always_has_error() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = RunRecord::new("r", at, Cadence::Daily, "broker", false, Some("  ".to_string()));
        assert_eq!(record.error.as_deref(), Some(UNKNOWN_FAILURE));

        let record = RunRecord::new("r", at, Cadence::Daily, "broker", false, None);
        assert_eq!(record.error.as_deref(), Some(UNKNOWN_FAILURE));
    }

    #[test]
    fn test_successful_record_drops_error() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = RunRecord::new("r", at, Cadence::Daily, "broker", true, Some("stale".to_string()))
            .with_error_kind(FetchFailureKind::Other);
        assert_eq!(record.error, None);
        assert_eq!(record.error_kind, None);
    }

    #[test]
    fn test_from_outcome_stores_cause_and_kind_separately() {
        let ctx = FetchContext::new(Cadence::Hourly, Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap());
        let record = RunRecord::from_outcome(&ctx, "forex", &Err(FetchFailure::network("connection reset")));
        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("connection reset"));
        assert_eq!(record.error_kind, Some(FetchFailureKind::Network));
        assert_eq!(record.run_at, ctx.run_at);
        assert_eq!(record.run_id, ctx.run_id);
    }
}
