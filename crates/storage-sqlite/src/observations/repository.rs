use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::sql_types::{Double, Text};
use diesel::sqlite::{Sqlite, SqliteConnection};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use networth_core::errors::{Result, ValidationError};
use networth_core::observations::{
    validate_column_name, FamilyName, LatestValue, NewObservationRow, ObservationRepositoryTrait,
    ObservationRow,
};
use networth_core::utils::time_utils::{format_timestamp, parse_timestamp};

use super::model::{ColumnNameRow, FamilyRowDB, LatestValueDB, ObservationFamilyDB};
use super::sql;
use crate::db::{get_connection, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::observation_families;
use networth_core::constants::TIMESTAMP_COLUMN;

pub struct ObservationRepository {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

fn unknown_family(family: &FamilyName) -> networth_core::Error {
    ValidationError::UnknownFamily(family.to_string()).into()
}

fn is_registered(conn: &mut SqliteConnection, family: &FamilyName) -> Result<bool> {
    let count: i64 = observation_families::table
        .filter(observation_families::name.eq(family.as_str()))
        .count()
        .get_result(conn)
        .into_core()?;
    Ok(count > 0)
}

/// Instrument columns of a family table, in table order.
fn table_columns(conn: &mut SqliteConnection, family: &FamilyName) -> Result<Vec<String>> {
    let rows: Vec<ColumnNameRow> = sql_query("SELECT name FROM pragma_table_info(?) ORDER BY cid")
        .bind::<Text, _>(family.as_str())
        .load(conn)
        .into_core()?;
    Ok(rows
        .into_iter()
        .map(|r| r.name)
        .filter(|name| name != TIMESTAMP_COLUMN)
        .collect())
}

fn registered_columns(conn: &mut SqliteConnection, family: &FamilyName) -> Result<Vec<String>> {
    if !is_registered(conn, family)? {
        return Err(unknown_family(family));
    }
    table_columns(conn, family)
}

fn to_observation_row(row: FamilyRowDB, columns: &[String]) -> Result<ObservationRow> {
    let cells: BTreeMap<String, Option<f64>> = serde_json::from_str(&row.payload)?;
    let values = columns
        .iter()
        .map(|c| (c.clone(), cells.get(c).copied().flatten()))
        .collect();
    Ok(ObservationRow {
        timestamp: parse_timestamp(&row.date)?,
        values,
    })
}

impl ObservationRepository {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

/// SQLite column names are case-insensitive.
fn has_column(existing: &[String], column: &str) -> bool {
    existing.iter().any(|c| c.eq_ignore_ascii_case(column))
}

#[async_trait]
impl ObservationRepositoryTrait for ObservationRepository {
    async fn ensure_family(&self, family: &FamilyName, columns: &[String]) -> Result<()> {
        for column in columns {
            validate_column_name(column)?;
        }
        let family = family.clone();
        let columns = columns.to_vec();
        self.writer
            .exec(move |conn| {
                if !is_registered(conn, &family)? {
                    sql_query(sql::create_family_table(family.as_str()))
                        .execute(conn)
                        .into_core()?;
                    diesel::insert_into(observation_families::table)
                        .values(ObservationFamilyDB {
                            name: family.to_string(),
                            created_at: format_timestamp(&Utc::now()),
                        })
                        .execute(conn)
                        .into_core()?;
                    info!("Created observation family {}", family);
                }
                let mut existing = table_columns(conn, &family)?;
                for column in columns {
                    if has_column(&existing, &column) {
                        continue;
                    }
                    sql_query(sql::add_column(family.as_str(), &column))
                        .execute(conn)
                        .into_core()?;
                    info!("Added column {} to {}", column, family);
                    existing.push(column);
                }
                Ok(())
            })
            .await
    }

    async fn add_column(&self, family: &FamilyName, column: &str) -> Result<bool> {
        validate_column_name(column)?;
        let family = family.clone();
        let column = column.to_string();
        self.writer
            .exec(move |conn| {
                let existing = registered_columns(conn, &family)?;
                if has_column(&existing, &column) {
                    debug!("{} already has column {}", family, column);
                    return Ok(false);
                }
                sql_query(sql::add_column(family.as_str(), &column))
                    .execute(conn)
                    .into_core()?;
                info!("Added column {} to {}", column, family);
                Ok(true)
            })
            .await
    }

    async fn append(&self, row: NewObservationRow) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let existing = registered_columns(conn, &row.family)?;
                if let Some(column) = row.values.keys().find(|c| !existing.contains(*c)) {
                    return Err(ValidationError::UnknownColumn {
                        family: row.family.to_string(),
                        column: column.clone(),
                    }
                    .into());
                }
                let columns: Vec<&str> = row.values.keys().map(String::as_str).collect();
                let mut query = sql_query(sql::insert_row(row.family.as_str(), &columns))
                    .into_boxed::<Sqlite>()
                    .bind::<Text, _>(format_timestamp(&row.timestamp));
                for value in row.values.values() {
                    query = query.bind::<Double, _>(*value);
                }
                query.execute(conn).into_core()?;
                debug!("Appended {} values to {} at {}", row.values.len(), row.family, row.timestamp);
                Ok(())
            })
            .await
    }

    fn list_families(&self) -> Result<Vec<FamilyName>> {
        let mut conn = get_connection(&self.pool)?;
        let names: Vec<String> = observation_families::table
            .select(observation_families::name)
            .order(observation_families::name.asc())
            .load(&mut conn)
            .into_core()?;
        Ok(names
            .into_iter()
            .filter_map(|name| match FamilyName::parse(&name) {
                Ok(family) => Some(family),
                Err(e) => {
                    warn!("Ignoring registered family {}: {}", name, e);
                    None
                }
            })
            .collect())
    }

    fn list_columns(&self, family: &FamilyName) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        registered_columns(&mut conn, family)
    }

    fn latest_row_as_of(&self, family: &FamilyName, as_of: DateTime<Utc>) -> Result<Option<ObservationRow>> {
        let mut conn = get_connection(&self.pool)?;
        let columns = registered_columns(&mut conn, family)?;
        let query = sql::select_rows(
            family.as_str(),
            &columns,
            &format!("{} <= ?", sql::quote_ident(TIMESTAMP_COLUMN)),
            true,
            Some(1),
        );
        let row: Option<FamilyRowDB> = sql_query(query)
            .bind::<Text, _>(format_timestamp(&as_of))
            .get_result(&mut conn)
            .optional()
            .into_core()?;
        row.map(|r| to_observation_row(r, &columns)).transpose()
    }

    fn latest_value_as_of(
        &self,
        family: &FamilyName,
        column: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LatestValue>> {
        let mut conn = get_connection(&self.pool)?;
        let columns = registered_columns(&mut conn, family)?;
        if !columns.iter().any(|c| c == column) {
            return Err(ValidationError::UnknownColumn {
                family: family.to_string(),
                column: column.to_string(),
            }
            .into());
        }
        let latest: Option<LatestValueDB> = sql_query(sql::latest_value(family.as_str(), column))
            .bind::<Text, _>(format_timestamp(&as_of))
            .get_result(&mut conn)
            .optional()
            .into_core()?;
        latest
            .map(|row| {
                Ok(LatestValue {
                    timestamp: parse_timestamp(&row.date)?,
                    value: row.value,
                })
            })
            .transpose()
    }

    fn rows_between(
        &self,
        family: &FamilyName,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ObservationRow>> {
        let mut conn = get_connection(&self.pool)?;
        let columns = registered_columns(&mut conn, family)?;

        let ts = sql::quote_ident(TIMESTAMP_COLUMN);
        let mut conditions = Vec::new();
        let mut binds = Vec::new();
        if let Some(from) = from {
            conditions.push(format!("{} >= ?", ts));
            binds.push(format_timestamp(&from));
        }
        if let Some(to) = to {
            conditions.push(format!("{} <= ?", ts));
            binds.push(format_timestamp(&to));
        }

        let sql = sql::select_rows(family.as_str(), &columns, &conditions.join(" AND "), false, None);
        let mut query = sql_query(sql).into_boxed::<Sqlite>();
        for bind in binds {
            query = query.bind::<Text, _>(bind);
        }
        let rows: Vec<FamilyRowDB> = query.load(&mut conn).into_core()?;
        rows.into_iter().map(|r| to_observation_row(r, &columns)).collect()
    }
}
