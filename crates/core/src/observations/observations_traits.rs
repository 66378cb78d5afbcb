use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::identifiers::FamilyName;
use super::observations_model::{LatestValue, NewObservationRow, ObservationRow};
use crate::errors::Result;

/// Persistence for observation families.
///
/// Rows are append-only. The only schema change is adding a nullable column
/// for a newly tracked instrument, which never rewrites historical rows.
#[async_trait]
pub trait ObservationRepositoryTrait: Send + Sync {
    /// Creates the family table if needed and adds any missing columns.
    async fn ensure_family(&self, family: &FamilyName, columns: &[String]) -> Result<()>;

    /// Adds one nullable column. Returns false if it already existed.
    async fn add_column(&self, family: &FamilyName, column: &str) -> Result<bool>;

    /// Appends one row. Fails with a unique violation if the family already
    /// has a row at that timestamp, and with `UnknownColumn` for columns the
    /// table does not have.
    async fn append(&self, row: NewObservationRow) -> Result<()>;

    fn list_families(&self) -> Result<Vec<FamilyName>>;

    fn list_columns(&self, family: &FamilyName) -> Result<Vec<String>>;

    /// Latest row with timestamp <= `as_of`.
    fn latest_row_as_of(
        &self,
        family: &FamilyName,
        as_of: DateTime<Utc>,
    ) -> Result<Option<ObservationRow>>;

    /// Latest non-null value of `column` with timestamp <= `as_of`.
    fn latest_value_as_of(
        &self,
        family: &FamilyName,
        column: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LatestValue>>;

    /// Rows in `[from, to]`, oldest first.
    fn rows_between(
        &self,
        family: &FamilyName,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ObservationRow>>;
}
