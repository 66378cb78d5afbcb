use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use networth_core::errors::Result;
use networth_core::real_estate::{
    AppraisalSite, NewAppraisal, RealEstateRepositoryTrait, RealEstateValuation,
};
use networth_core::utils::time_utils::format_timestamp;

use super::model::RealEstatePriceDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::real_estate_prices;

pub struct RealEstateRepository {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl RealEstateRepository {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

/// Folds per-site rows into one valuation per (timestamp, property).
/// Rows must arrive ordered by date then name.
fn fold_valuations(rows: Vec<NewAppraisal>) -> Vec<RealEstateValuation> {
    let mut out: Vec<RealEstateValuation> = Vec::new();
    let mut current: Option<(DateTime<Utc>, String, Option<f64>, Option<f64>)> = None;

    for row in rows {
        let same = matches!(&current, Some((ts, name, _, _)) if *ts == row.timestamp && *name == row.property);
        if !same {
            if let Some((ts, name, redfin, zillow)) = current.take() {
                out.push(RealEstateValuation::new(ts, name, redfin, zillow));
            }
            current = Some((row.timestamp, row.property.clone(), None, None));
        }
        if let Some((_, _, redfin, zillow)) = current.as_mut() {
            match row.site {
                AppraisalSite::Redfin => *redfin = Some(row.value),
                AppraisalSite::Zillow => *zillow = Some(row.value),
            }
        }
    }
    if let Some((ts, name, redfin, zillow)) = current {
        out.push(RealEstateValuation::new(ts, name, redfin, zillow));
    }
    out
}

#[async_trait]
impl RealEstateRepositoryTrait for RealEstateRepository {
    async fn append_appraisals(&self, appraisals: Vec<NewAppraisal>) -> Result<()> {
        if appraisals.is_empty() {
            return Ok(());
        }
        let rows: Vec<RealEstatePriceDB> = appraisals.into_iter().map(RealEstatePriceDB::from).collect();
        self.writer
            .exec(move |conn| {
                diesel::insert_into(real_estate_prices::table)
                    .values(&rows)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    fn list_valuations(&self, up_to: Option<DateTime<Utc>>) -> Result<Vec<RealEstateValuation>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = real_estate_prices::table
            .select(RealEstatePriceDB::as_select())
            .into_boxed();
        if let Some(up_to) = up_to {
            query = query.filter(real_estate_prices::date.le(format_timestamp(&up_to)));
        }
        let rows = query
            .order((
                real_estate_prices::date.asc(),
                real_estate_prices::name.asc(),
                real_estate_prices::site.asc(),
            ))
            .load::<RealEstatePriceDB>(&mut conn)
            .into_core()?;

        let appraisals = rows
            .into_iter()
            .map(NewAppraisal::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(fold_valuations(appraisals))
    }
}
