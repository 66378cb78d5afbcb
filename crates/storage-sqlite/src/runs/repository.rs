use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::{max, sql};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_types::BigInt;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use networth_core::cadence::Cadence;
use networth_core::errors::Result;
use networth_core::runs::{FetcherFailureSummary, PerformanceRecord, RunRecord, RunRecordRepositoryTrait};
use networth_core::utils::time_utils::format_timestamp;

use super::model::{FailureSummaryDB, PerformanceRecordDB, RunRecordDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::{performance_records, run_records};

const LAST_FAILURES_SQL: &str = "
    SELECT r.fetcher AS fetcher,
           r.cadence AS cadence,
           r.run_at AS failed_at,
           r.error AS error,
           r.error_kind AS error_kind,
           (SELECT MAX(s.run_at) FROM run_records s
             WHERE s.fetcher = r.fetcher AND s.success = 1) AS last_success_at
    FROM run_records r
    WHERE r.success = 0
      AND r.run_at = (SELECT MAX(f.run_at) FROM run_records f
                       WHERE f.fetcher = r.fetcher AND f.success = 0)
    ORDER BY r.fetcher";

pub struct RunRecordRepository {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl RunRecordRepository {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn rowid() -> diesel::expression::SqlLiteral<BigInt> {
    sql::<BigInt>("rowid")
}

#[async_trait]
impl RunRecordRepositoryTrait for RunRecordRepository {
    async fn record_invocation(&self, run: RunRecord, performance: PerformanceRecord) -> Result<()> {
        let run = RunRecordDB::from(run);
        let performance = PerformanceRecordDB::from(performance);
        self.writer
            .exec(move |conn| {
                diesel::insert_into(run_records::table)
                    .values(&run)
                    .execute(conn)
                    .into_core()?;
                diesel::insert_into(performance_records::table)
                    .values(&performance)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    fn latest_run_records(&self, cadence: Cadence) -> Result<Vec<RunRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let latest: Option<String> = run_records::table
            .filter(run_records::cadence.eq(cadence.as_str()))
            .select(max(run_records::run_at))
            .first(&mut conn)
            .into_core()?;
        let Some(latest) = latest else {
            return Ok(Vec::new());
        };
        run_records::table
            .filter(run_records::cadence.eq(cadence.as_str()))
            .filter(run_records::run_at.eq(latest))
            .order(rowid())
            .select(RunRecordDB::as_select())
            .load::<RunRecordDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(RunRecord::try_from)
            .collect()
    }

    fn run_records_since(&self, cadence: Cadence, since: DateTime<Utc>) -> Result<Vec<RunRecord>> {
        let mut conn = get_connection(&self.pool)?;
        run_records::table
            .filter(run_records::cadence.eq(cadence.as_str()))
            .filter(run_records::run_at.ge(format_timestamp(&since)))
            .order((run_records::run_at.asc(), rowid()))
            .select(RunRecordDB::as_select())
            .load::<RunRecordDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(RunRecord::try_from)
            .collect()
    }

    fn last_failures(&self) -> Result<Vec<FetcherFailureSummary>> {
        let mut conn = get_connection(&self.pool)?;
        diesel::sql_query(LAST_FAILURES_SQL)
            .load::<FailureSummaryDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(FetcherFailureSummary::try_from)
            .collect()
    }

    fn performance_for_run(&self, run_id: &str) -> Result<Vec<PerformanceRecord>> {
        let mut conn = get_connection(&self.pool)?;
        performance_records::table
            .filter(performance_records::run_id.eq(run_id))
            .order(rowid())
            .select(PerformanceRecordDB::as_select())
            .load::<PerformanceRecordDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(PerformanceRecord::try_from)
            .collect()
    }
}
