//! Database models for history snapshots.

use diesel::prelude::*;

use networth_core::errors::Result;
use networth_core::history::{HistoryInputs, HistorySnapshot};
use networth_core::utils::time_utils::{format_timestamp, parse_timestamp};

/// Full history row, including the generated totals.
#[derive(Queryable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HistoryDB {
    pub date: String,
    pub total_liquid: Option<f64>,
    pub total_real_estate: Option<f64>,
    pub total_retirement: Option<f64>,
    pub total_investing: Option<f64>,
    pub etfs: Option<f64>,
    pub commodities: Option<f64>,
    pub ira: Option<f64>,
    pub pillar2: Option<f64>,
    pub total_no_homes: Option<f64>,
    pub total: Option<f64>,
}

/// Insert model. The totals are generated columns and are never written.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::history)]
pub struct NewHistoryDB {
    pub date: String,
    pub total_liquid: Option<f64>,
    pub total_real_estate: Option<f64>,
    pub total_retirement: Option<f64>,
    pub total_investing: Option<f64>,
    pub etfs: Option<f64>,
    pub commodities: Option<f64>,
    pub ira: Option<f64>,
    pub pillar2: Option<f64>,
}

impl From<&HistorySnapshot> for NewHistoryDB {
    fn from(snapshot: &HistorySnapshot) -> Self {
        let inputs = snapshot.inputs();
        Self {
            date: format_timestamp(&snapshot.timestamp()),
            total_liquid: inputs.total_liquid,
            total_real_estate: inputs.total_real_estate,
            total_retirement: inputs.total_retirement,
            total_investing: inputs.total_investing,
            etfs: inputs.etfs,
            commodities: inputs.commodities,
            ira: inputs.ira,
            pillar2: inputs.pillar2,
        }
    }
}

impl TryFrom<HistoryDB> for HistorySnapshot {
    type Error = networth_core::Error;

    fn try_from(db: HistoryDB) -> Result<Self> {
        let inputs = HistoryInputs {
            total_liquid: db.total_liquid,
            total_real_estate: db.total_real_estate,
            total_retirement: db.total_retirement,
            total_investing: db.total_investing,
            etfs: db.etfs,
            commodities: db.commodities,
            ira: db.ira,
            pillar2: db.pillar2,
        };
        Ok(HistorySnapshot::new(parse_timestamp(&db.date)?, inputs))
    }
}
