//! Pipeline definition loaded from TOML.
//!
//! ```toml
//! [[fetcher]]
//! name = "forex"
//! cadence = "hourly"
//! command = ["python3", "scrapers/forex.py"]
//! output = { kind = "family", family = "forex", columns = ["CHFUSD=X"] }
//!
//! [history.total_liquid]
//! kind = "sum"
//! family = "balances"
//! columns = ["checking", "savings"]
//!
//! [cadences.daily]
//! skip_succeeded_in_period = true
//! ```

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cadence::{Cadence, CadencePlan};
use crate::constants::DEFAULT_FETCHER_TIMEOUT_SECS;
use crate::errors::{ConfigError, Result};
use crate::fetchers::{CommandFetcher, CommandOutput, FetcherUnit};
use crate::history::{FieldSource, HistoryField, HistoryMapping};
use crate::observations::{validate_column_name, ObservationRepositoryTrait};
use crate::real_estate::RealEstateRepositoryTrait;

fn default_timeout_secs() -> u64 {
    DEFAULT_FETCHER_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandFetcherConfig {
    pub name: String,
    pub cadence: Cadence,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub output: CommandOutput,
}

/// Per-cadence switches. Unset values fall back to the cadence's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CadenceOptions {
    pub aggregate_history: Option<bool>,
    pub skip_succeeded_in_period: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CadenceTable {
    pub hourly: Option<CadenceOptions>,
    pub daily: Option<CadenceOptions>,
    pub weekly: Option<CadenceOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default, rename = "fetcher")]
    pub fetchers: Vec<CommandFetcherConfig>,
    /// History field name to its source.
    #[serde(default)]
    pub history: BTreeMap<String, FieldSource>,
    #[serde(default)]
    pub cadences: CadenceTable,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!(
            "Loaded {} fetchers and {} history sources from {}",
            config.fetchers.len(),
            config.history.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut owners: HashMap<String, &str> = HashMap::new();
        for fetcher in &self.fetchers {
            if !names.insert(fetcher.name.as_str()) {
                return Err(ConfigError::DuplicateFetcher(fetcher.name.clone()).into());
            }
            let target = match &fetcher.output {
                CommandOutput::Family { family, .. } => family.to_string(),
                CommandOutput::RealEstate => "real_estate".to_string(),
            };
            if let Some(owner) = owners.get(&target) {
                return Err(ConfigError::SharedOutput {
                    target,
                    owner: owner.to_string(),
                    other: fetcher.name.clone(),
                }
                .into());
            }
            owners.insert(target, fetcher.name.as_str());
            if fetcher.command.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(ConfigError::EmptyCommand(fetcher.name.clone()).into());
            }
            if fetcher.timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: format!("fetcher.{}.timeout_secs", fetcher.name),
                    message: "must be positive".to_string(),
                }
                .into());
            }
            if let CommandOutput::Family { columns, .. } = &fetcher.output {
                for column in columns {
                    validate_column_name(column)?;
                }
            }
        }
        self.history_mapping()?;
        Ok(())
    }

    pub fn history_mapping(&self) -> Result<HistoryMapping> {
        let mut mapping = HistoryMapping::new();
        for (key, source) in &self.history {
            let field: HistoryField = key.parse().map_err(|_| ConfigError::InvalidValue {
                key: format!("history.{}", key),
                message: "unknown history field".to_string(),
            })?;
            mapping.insert(field, source.clone());
        }
        Ok(mapping)
    }

    /// Options for `cadence` with defaults applied: hourly aggregates history,
    /// daily skips fetchers that already succeeded today.
    pub fn cadence_options(&self, cadence: Cadence) -> (bool, bool) {
        let options = match cadence {
            Cadence::Hourly => self.cadences.hourly,
            Cadence::Daily => self.cadences.daily,
            Cadence::Weekly => self.cadences.weekly,
        }
        .unwrap_or_default();
        let aggregate = options.aggregate_history.unwrap_or(cadence == Cadence::Hourly);
        let skip = options.skip_succeeded_in_period.unwrap_or(cadence == Cadence::Daily);
        (aggregate, skip)
    }

    pub fn fetcher_names(&self, cadence: Cadence) -> Vec<String> {
        self.fetchers
            .iter()
            .filter(|f| f.cadence == cadence)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Family fetchers create their table and columns in `prepare`, so
    /// nothing here touches storage.
    pub fn build_fetchers(
        &self,
        observations: Arc<dyn ObservationRepositoryTrait>,
        real_estate: Arc<dyn RealEstateRepositoryTrait>,
    ) -> Result<Vec<(Cadence, Arc<dyn FetcherUnit>)>> {
        self.fetchers
            .iter()
            .map(|config| -> Result<(Cadence, Arc<dyn FetcherUnit>)> {
                let fetcher = match &config.output {
                    CommandOutput::Family { family, columns } => CommandFetcher::for_family(
                        config.name.clone(),
                        config.command.clone(),
                        family.clone(),
                        observations.clone(),
                    )?
                    .with_columns(columns.clone()),
                    CommandOutput::RealEstate => CommandFetcher::for_real_estate(
                        config.name.clone(),
                        config.command.clone(),
                        real_estate.clone(),
                    )?,
                }
                .with_timeout(Duration::from_secs(config.timeout_secs))
                .with_env(config.env.clone());
                Ok((config.cadence, Arc::new(fetcher) as Arc<dyn FetcherUnit>))
            })
            .collect()
    }

    pub fn cadence_plan(&self, cadence: Cadence, fetchers: &[(Cadence, Arc<dyn FetcherUnit>)]) -> CadencePlan {
        let (aggregate, skip) = self.cadence_options(cadence);
        fetchers
            .iter()
            .filter(|(c, _)| *c == cadence)
            .fold(CadencePlan::new(cadence), |plan, (_, fetcher)| plan.with_fetcher(fetcher.clone()))
            .with_history(aggregate)
            .with_period_dedup(skip)
    }
}
