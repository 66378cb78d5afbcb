use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use std::time::Duration;

use super::{RunRecordDB, RunRecordRepository};
use crate::db::{get_connection, Database};
use crate::errors::IntoCore;
use crate::schema::run_records;
use networth_core::cadence::Cadence;
use networth_core::errors::{DatabaseError, Error};
use networth_core::fetchers::{FetchContext, FetchFailure, FetchFailureKind};
use networth_core::runs::{PerformanceRecord, RunRecord, RunRecordRepositoryTrait};

fn setup() -> (tempfile::TempDir, Database, RunRecordRepository) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();
    let repo = RunRecordRepository::new(db.pool.clone(), db.writer.clone());
    (dir, db, repo)
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, day, hour, 0, 0).unwrap()
}

async fn record(
    repo: &RunRecordRepository,
    ctx: &FetchContext,
    fetcher: &str,
    outcome: Result<(), FetchFailure>,
) -> networth_core::Result<()> {
    repo.record_invocation(
        RunRecord::from_outcome(ctx, fetcher, &outcome),
        PerformanceRecord::new(ctx, fetcher, Duration::from_millis(250)),
    )
    .await
}

#[tokio::test]
async fn test_latest_run_records_returns_only_most_recent_run() {
    let (_dir, _db, repo) = setup();
    let first = FetchContext::new(Cadence::Daily, at(1, 6));
    let second = FetchContext::new(Cadence::Daily, at(2, 6));
    let hourly = FetchContext::new(Cadence::Hourly, at(3, 6));

    record(&repo, &first, "bank", Ok(())).await.unwrap();
    record(&repo, &second, "broker", Err(FetchFailure::auth("2FA"))).await.unwrap();
    record(&repo, &second, "bank", Ok(())).await.unwrap();
    record(&repo, &hourly, "forex", Ok(())).await.unwrap();

    let latest = repo.latest_run_records(Cadence::Daily).unwrap();
    let names: Vec<(&str, bool)> = latest.iter().map(|r| (r.fetcher.as_str(), r.success)).collect();
    assert_eq!(names, vec![("broker", false), ("bank", true)]);
    assert_eq!(latest[0].error.as_deref(), Some("2FA"));
    assert_eq!(latest[0].error_kind, Some(FetchFailureKind::Auth));
    assert_eq!(latest[1].error_kind, None);
    assert_eq!(latest[0].run_at, at(2, 6));

    assert!(repo.latest_run_records(Cadence::Weekly).unwrap().is_empty());
}

#[tokio::test]
async fn test_one_record_per_run_and_fetcher() {
    let (_dir, _db, repo) = setup();
    let ctx = FetchContext::new(Cadence::Hourly, at(1, 10));

    record(&repo, &ctx, "forex", Ok(())).await.unwrap();
    let err = record(&repo, &ctx, "forex", Ok(())).await.unwrap_err();

    assert!(matches!(err, Error::Database(DatabaseError::UniqueViolation(_))));
    assert_eq!(repo.performance_for_run(&ctx.run_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_record_without_error_violates_check() {
    let (_dir, db, _repo) = setup();
    let row = RunRecordDB {
        run_id: "r".to_string(),
        run_at: "2024-10-01T00:00:00.000000Z".to_string(),
        cadence: "daily".to_string(),
        fetcher: "bank".to_string(),
        success: false,
        error: Some("  ".to_string()),
        error_kind: None,
    };

    let err = db
        .writer
        .exec(move |conn| {
            diesel::insert_into(run_records::table)
                .values(&row)
                .execute(conn)
                .into_core()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Database(DatabaseError::CheckViolation(_))));
    let mut conn = get_connection(&db.pool).unwrap();
    let count: i64 = run_records::table.count().get_result(&mut conn).unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_run_records_since_and_performance() {
    let (_dir, _db, repo) = setup();
    let early = FetchContext::new(Cadence::Daily, at(1, 1));
    let late = FetchContext::new(Cadence::Daily, at(1, 9));
    record(&repo, &early, "bank", Err(FetchFailure::network("reset"))).await.unwrap();
    record(&repo, &late, "bank", Ok(())).await.unwrap();

    let since = repo.run_records_since(Cadence::Daily, at(1, 5)).unwrap();
    assert_eq!(since.len(), 1);
    assert!(since[0].success);

    let perf = repo.performance_for_run(&late.run_id).unwrap();
    assert_eq!(perf[0].fetcher, "bank");
    assert!((perf[0].elapsed_seconds - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn test_last_failures_per_fetcher() {
    let (_dir, _db, repo) = setup();
    let day1 = FetchContext::new(Cadence::Daily, at(1, 6));
    let day2 = FetchContext::new(Cadence::Daily, at(2, 6));
    let day3 = FetchContext::new(Cadence::Daily, at(3, 6));

    record(&repo, &day1, "bank", Err(FetchFailure::network("old"))).await.unwrap();
    record(&repo, &day2, "bank", Err(FetchFailure::network("newer"))).await.unwrap();
    record(&repo, &day3, "bank", Ok(())).await.unwrap();
    record(&repo, &day3, "broker", Err(FetchFailure::auth("expired"))).await.unwrap();
    record(&repo, &day3, "forex", Ok(())).await.unwrap();

    let failures = repo.last_failures().unwrap();

    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].fetcher, "bank");
    assert_eq!(failures[0].failed_at, at(2, 6));
    assert_eq!(failures[0].error, "newer");
    assert_eq!(failures[0].error_kind, Some(FetchFailureKind::Network));
    assert_eq!(failures[0].last_success_at, Some(at(3, 6)));
    assert!(failures[0].is_resolved());
    assert_eq!(failures[1].fetcher, "broker");
    assert!(!failures[1].is_resolved());
}
