use diesel::prelude::*;

use networth_core::errors::Result;
use networth_core::real_estate::{AppraisalSite, NewAppraisal};
use networth_core::utils::time_utils::{format_timestamp, parse_timestamp};

/// One site estimate as stored in `real_estate_prices`.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::real_estate_prices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RealEstatePriceDB {
    pub date: String,
    pub name: String,
    pub site: String,
    pub value: f64,
}

impl From<NewAppraisal> for RealEstatePriceDB {
    fn from(appraisal: NewAppraisal) -> Self {
        Self {
            date: format_timestamp(&appraisal.timestamp),
            name: appraisal.property,
            site: appraisal.site.as_str().to_string(),
            value: appraisal.value,
        }
    }
}

impl TryFrom<RealEstatePriceDB> for NewAppraisal {
    type Error = networth_core::Error;

    fn try_from(db: RealEstatePriceDB) -> Result<Self> {
        let site: AppraisalSite = db.site.parse()?;
        NewAppraisal::new(parse_timestamp(&db.date)?, db.name, site, db.value)
    }
}
