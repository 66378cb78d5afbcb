use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::cadence::Cadence;
use crate::fetchers::{FetchContext, FetchFailure, FetchFailureKind};
use crate::test_support::InMemoryRuns;

fn ctx() -> FetchContext {
    FetchContext::new(Cadence::Daily, Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap())
}

#[tokio::test]
async fn test_records_success_and_timing() {
    let runs = Arc::new(InMemoryRuns::default());
    let recorder = RunRecorder::new(runs.clone());
    let ctx = ctx();

    let status = recorder
        .record(&ctx, "forex", &Ok(()), Duration::from_millis(1500))
        .await;

    assert_eq!(status, RecordStatus::Recorded);
    let records = runs.latest_run_records(Cadence::Daily).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    let perf = runs.performance_for_run(&ctx.run_id).unwrap();
    assert_eq!(perf.len(), 1);
    assert!((perf[0].elapsed_seconds - 1.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_records_failure_with_cause() {
    let runs = Arc::new(InMemoryRuns::default());
    let recorder = RunRecorder::new(runs.clone());

    recorder
        .record(&ctx(), "broker", &Err(FetchFailure::auth("2FA required")), Duration::ZERO)
        .await;

    let records = runs.latest_run_records(Cadence::Daily).unwrap();
    assert!(!records[0].success);
    assert_eq!(records[0].error.as_deref(), Some("2FA required"));
    assert_eq!(records[0].error_kind, Some(FetchFailureKind::Auth));
}

#[tokio::test]
async fn test_write_failure_is_returned_not_raised() {
    let runs = Arc::new(InMemoryRuns::default());
    runs.fail_writes(true);
    let recorder = RunRecorder::new(runs.clone());

    let status = recorder.record(&ctx(), "forex", &Ok(()), Duration::ZERO).await;

    assert!(matches!(status, RecordStatus::WriteFailed(_)));
    assert!(runs.latest_run_records(Cadence::Daily).unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_invocation_is_rejected() {
    let runs = Arc::new(InMemoryRuns::default());
    let recorder = RunRecorder::new(runs.clone());
    let ctx = ctx();

    assert_eq!(recorder.record(&ctx, "forex", &Ok(()), Duration::ZERO).await, RecordStatus::Recorded);
    let second = recorder.record(&ctx, "forex", &Ok(()), Duration::ZERO).await;

    assert!(matches!(second, RecordStatus::WriteFailed(_)));
    assert_eq!(runs.latest_run_records(Cadence::Daily).unwrap().len(), 1);
}
