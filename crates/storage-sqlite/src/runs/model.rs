//! Database models for the run ledger.

use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};

use networth_core::errors::Result;
use networth_core::runs::{FetcherFailureSummary, PerformanceRecord, RunRecord};
use networth_core::utils::time_utils::{format_timestamp, parse_timestamp};

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::run_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RunRecordDB {
    pub run_id: String,
    pub run_at: String,
    pub cadence: String,
    pub fetcher: String,
    pub success: bool,
    pub error: Option<String>,
    pub error_kind: Option<String>,
}

impl From<RunRecord> for RunRecordDB {
    fn from(record: RunRecord) -> Self {
        Self {
            run_id: record.run_id,
            run_at: format_timestamp(&record.run_at),
            cadence: record.cadence.as_str().to_string(),
            fetcher: record.fetcher,
            success: record.success,
            error: record.error,
            error_kind: record.error_kind.map(|k| k.as_str().to_string()),
        }
    }
}

impl TryFrom<RunRecordDB> for RunRecord {
    type Error = networth_core::Error;

    fn try_from(db: RunRecordDB) -> Result<Self> {
        let record = RunRecord::new(
            db.run_id,
            parse_timestamp(&db.run_at)?,
            db.cadence.parse()?,
            db.fetcher,
            db.success,
            db.error,
        );
        Ok(match db.error_kind {
            Some(kind) => record.with_error_kind(kind.parse()?),
            None => record,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::performance_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PerformanceRecordDB {
    pub run_id: String,
    pub run_at: String,
    pub cadence: String,
    pub fetcher: String,
    pub elapsed_seconds: f64,
}

impl From<PerformanceRecord> for PerformanceRecordDB {
    fn from(record: PerformanceRecord) -> Self {
        Self {
            run_id: record.run_id,
            run_at: format_timestamp(&record.run_at),
            cadence: record.cadence.as_str().to_string(),
            fetcher: record.fetcher,
            elapsed_seconds: record.elapsed_seconds,
        }
    }
}

impl TryFrom<PerformanceRecordDB> for PerformanceRecord {
    type Error = networth_core::Error;

    fn try_from(db: PerformanceRecordDB) -> Result<Self> {
        Ok(PerformanceRecord {
            run_id: db.run_id,
            run_at: parse_timestamp(&db.run_at)?,
            cadence: db.cadence.parse()?,
            fetcher: db.fetcher,
            elapsed_seconds: db.elapsed_seconds,
        })
    }
}

/// Latest failure of one fetcher, from a raw query.
#[derive(QueryableByName, Debug)]
pub struct FailureSummaryDB {
    #[diesel(sql_type = Text)]
    pub fetcher: String,
    #[diesel(sql_type = Text)]
    pub cadence: String,
    #[diesel(sql_type = Text)]
    pub failed_at: String,
    #[diesel(sql_type = Text)]
    pub error: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub error_kind: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub last_success_at: Option<String>,
}

impl TryFrom<FailureSummaryDB> for FetcherFailureSummary {
    type Error = networth_core::Error;

    fn try_from(db: FailureSummaryDB) -> Result<Self> {
        Ok(FetcherFailureSummary {
            fetcher: db.fetcher,
            cadence: db.cadence.parse()?,
            failed_at: parse_timestamp(&db.failed_at)?,
            error: db.error,
            error_kind: db.error_kind.as_deref().map(str::parse).transpose()?,
            last_success_at: db.last_success_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}
