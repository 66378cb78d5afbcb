use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use log::debug;
use std::sync::Arc;

use networth_core::errors::Result;
use networth_core::history::{HistoryRepositoryTrait, HistorySnapshot};
use networth_core::utils::time_utils::format_timestamp;

use super::model::{HistoryDB, NewHistoryDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::history;

pub struct HistoryRepository {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl HistoryRepository {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn to_snapshots(rows: Vec<HistoryDB>) -> Result<Vec<HistorySnapshot>> {
    rows.into_iter().map(HistorySnapshot::try_from).collect()
}

#[async_trait]
impl HistoryRepositoryTrait for HistoryRepository {
    async fn upsert_snapshot(&self, snapshot: HistorySnapshot) -> Result<()> {
        let row = NewHistoryDB::from(&snapshot);
        self.writer
            .exec(move |conn| {
                diesel::replace_into(history::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                debug!("Stored history snapshot {}", row.date);
                Ok(())
            })
            .await
    }

    fn get_snapshot(&self, timestamp: DateTime<Utc>) -> Result<Option<HistorySnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        history::table
            .find(format_timestamp(&timestamp))
            .select(HistoryDB::as_select())
            .first::<HistoryDB>(&mut conn)
            .optional()
            .into_core()?
            .map(HistorySnapshot::try_from)
            .transpose()
    }

    fn list_snapshots(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistorySnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = history::table.select(HistoryDB::as_select()).into_boxed();
        if let Some(from) = from {
            query = query.filter(history::date.ge(format_timestamp(&from)));
        }
        if let Some(to) = to {
            query = query.filter(history::date.le(format_timestamp(&to)));
        }
        let rows = query
            .order(history::date.asc())
            .load::<HistoryDB>(&mut conn)
            .into_core()?;
        to_snapshots(rows)
    }

    fn latest_snapshot_before(&self, before: DateTime<Utc>) -> Result<Option<HistorySnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        history::table
            .filter(history::date.lt(format_timestamp(&before)))
            .order(history::date.desc())
            .select(HistoryDB::as_select())
            .first::<HistoryDB>(&mut conn)
            .optional()
            .into_core()?
            .map(HistorySnapshot::try_from)
            .transpose()
    }

    fn latest_snapshot(&self) -> Result<Option<HistorySnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        history::table
            .order(history::date.desc())
            .select(HistoryDB::as_select())
            .first::<HistoryDB>(&mut conn)
            .optional()
            .into_core()?
            .map(HistorySnapshot::try_from)
            .transpose()
    }
}
