use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::real_estate_model::{NewAppraisal, RealEstateValuation};
use crate::errors::Result;

#[async_trait]
pub trait RealEstateRepositoryTrait: Send + Sync {
    /// Appends site estimates, all or none. At most one estimate per
    /// (timestamp, property, site).
    async fn append_appraisals(&self, appraisals: Vec<NewAppraisal>) -> Result<()>;

    async fn append_appraisal(&self, appraisal: NewAppraisal) -> Result<()> {
        self.append_appraisals(vec![appraisal]).await
    }

    /// Valuations with timestamp <= `up_to` (all when `None`), ordered by
    /// timestamp then property. Derived values are computed on read.
    fn list_valuations(&self, up_to: Option<DateTime<Utc>>) -> Result<Vec<RealEstateValuation>>;
}
