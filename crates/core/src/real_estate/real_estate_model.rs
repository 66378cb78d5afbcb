use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result, ValidationError};

/// Appraisal site a property estimate was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AppraisalSite {
    Redfin,
    Zillow,
}

impl AppraisalSite {
    pub const ALL: [AppraisalSite; 2] = [AppraisalSite::Redfin, AppraisalSite::Zillow];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppraisalSite::Redfin => "Redfin",
            AppraisalSite::Zillow => "Zillow",
        }
    }
}

impl fmt::Display for AppraisalSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppraisalSite {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redfin" => Ok(AppraisalSite::Redfin),
            "zillow" => Ok(AppraisalSite::Zillow),
            other => Err(ValidationError::InvalidInput(format!("unknown appraisal site '{}'", other)).into()),
        }
    }
}

/// One site's estimate for one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppraisal {
    pub timestamp: DateTime<Utc>,
    pub property: String,
    pub site: AppraisalSite,
    pub value: f64,
}

impl NewAppraisal {
    pub fn new(
        timestamp: DateTime<Utc>,
        property: impl Into<String>,
        site: AppraisalSite,
        value: f64,
    ) -> Result<Self> {
        let property = property.into();
        if property.trim().is_empty() {
            return Err(ValidationError::InvalidInput("empty property name".to_string()).into());
        }
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidInput(format!(
                "invalid appraisal {} for '{}'",
                value, property
            ))
            .into());
        }
        Ok(Self {
            timestamp,
            property,
            site,
            value,
        })
    }
}

/// Both site estimates for one property at one timestamp.
///
/// `value` is derived: the mean of both estimates, and `None` unless both
/// were observed at this timestamp. It has no setter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealEstateValuation {
    pub timestamp: DateTime<Utc>,
    pub property: String,
    pub redfin: Option<f64>,
    pub zillow: Option<f64>,
    value: Option<f64>,
}

impl RealEstateValuation {
    pub fn new(
        timestamp: DateTime<Utc>,
        property: impl Into<String>,
        redfin: Option<f64>,
        zillow: Option<f64>,
    ) -> Self {
        let value = match (redfin, zillow) {
            (Some(a), Some(b)) => Some((a + b) / 2.0),
            _ => None,
        };
        Self {
            timestamp,
            property: property.into(),
            redfin,
            zillow,
            value,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_complete(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_value_is_mean_of_both_sites() {
        let v = RealEstateValuation::new(ts(), "Home", Some(500_000.0), Some(520_000.0));
        assert_eq!(v.value(), Some(510_000.0));
        assert!(v.is_complete());
    }

    #[test]
    fn test_single_site_has_no_value() {
        let only_redfin = RealEstateValuation::new(ts(), "Home", Some(500_000.0), None);
        let only_zillow = RealEstateValuation::new(ts(), "Home", None, Some(520_000.0));
        assert_eq!(only_redfin.value(), None);
        assert_eq!(only_zillow.value(), None);
    }

    #[test]
    fn test_site_parsing_is_case_insensitive() {
        assert_eq!("zillow".parse::<AppraisalSite>().unwrap(), AppraisalSite::Zillow);
        assert_eq!("Redfin".parse::<AppraisalSite>().unwrap(), AppraisalSite::Redfin);
        assert!("trulia".parse::<AppraisalSite>().is_err());
    }

    #[test]
    fn test_appraisal_rejects_negative_value() {
        assert!(NewAppraisal::new(ts(), "Home", AppraisalSite::Redfin, -1.0).is_err());
        assert!(NewAppraisal::new(ts(), " ", AppraisalSite::Redfin, 1.0).is_err());
    }
}
