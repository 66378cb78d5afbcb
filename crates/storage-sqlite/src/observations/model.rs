//! Row shapes for raw queries on family tables.

use diesel::prelude::*;
use diesel::sql_types::{Double, Text};

/// Database model for the family registry.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::observation_families)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ObservationFamilyDB {
    pub name: String,
    pub created_at: String,
}

#[derive(QueryableByName, Debug)]
pub struct ColumnNameRow {
    #[diesel(sql_type = Text)]
    pub name: String,
}

/// One family row with its cells packed into a JSON object.
#[derive(QueryableByName, Debug)]
pub struct FamilyRowDB {
    #[diesel(sql_type = Text)]
    pub date: String,
    #[diesel(sql_type = Text)]
    pub payload: String,
}

#[derive(QueryableByName, Debug)]
pub struct LatestValueDB {
    #[diesel(sql_type = Text)]
    pub date: String,
    #[diesel(sql_type = Double)]
    pub value: f64,
}
