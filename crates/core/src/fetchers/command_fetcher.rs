//! Fetcher that drives an external collector process.
//!
//! The process prints its observations as JSON on stdout; this fetcher
//! appends them at the run timestamp. A family process prints one object
//! (`{"CHFUSD": 1.13, "SGDUSD": 0.74}`), a real-estate process prints a list
//! of `{"name": ..., "site": "redfin" | "zillow", "value": ...}`.

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use super::fetcher_model::{FetchContext, FetchFailure, FetchFailureKind};
use super::fetcher_traits::FetcherUnit;
use crate::constants::DEFAULT_FETCHER_TIMEOUT_SECS;
use crate::errors::{Result, ValidationError};
use crate::observations::{FamilyName, NewObservationRow, ObservationRepositoryTrait};
use crate::real_estate::{AppraisalSite, NewAppraisal, RealEstateRepositoryTrait};
use crate::utils::time_utils::format_timestamp;

const STDERR_TAIL_CHARS: usize = 500;

/// Where a command fetcher's output goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutput {
    Family {
        family: FamilyName,
        /// Tracked instruments; missing columns are added on startup.
        #[serde(default)]
        columns: Vec<String>,
    },
    RealEstate,
}

enum Sink {
    Family {
        family: FamilyName,
        store: Arc<dyn ObservationRepositoryTrait>,
    },
    RealEstate {
        store: Arc<dyn RealEstateRepositoryTrait>,
    },
}

#[derive(Deserialize)]
struct AppraisalLine {
    #[serde(alias = "name")]
    property: String,
    site: String,
    value: f64,
}

pub struct CommandFetcher {
    name: String,
    program: String,
    args: Vec<String>,
    /// Columns the family table must have before the first run.
    columns: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Duration,
    sink: Sink,
}

impl CommandFetcher {
    fn new(name: impl Into<String>, command: Vec<String>, sink: Sink) -> Result<Self> {
        let name = name.into();
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ValidationError::InvalidInput(format!("fetcher '{}' has no command", name)))?;
        Ok(Self {
            name,
            program,
            args: parts.collect(),
            columns: Vec::new(),
            env: BTreeMap::new(),
            timeout: Duration::from_secs(DEFAULT_FETCHER_TIMEOUT_SECS),
            sink,
        })
    }

    pub fn for_family(
        name: impl Into<String>,
        command: Vec<String>,
        family: FamilyName,
        store: Arc<dyn ObservationRepositoryTrait>,
    ) -> Result<Self> {
        Self::new(name, command, Sink::Family { family, store })
    }

    pub fn for_real_estate(
        name: impl Into<String>,
        command: Vec<String>,
        store: Arc<dyn RealEstateRepositoryTrait>,
    ) -> Result<Self> {
        Self::new(name, command, Sink::RealEstate { store })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    async fn run_process(&self, ctx: &FetchContext) -> std::result::Result<Vec<u8>, FetchFailure> {
        debug!("Running '{}' for fetcher {}", self.program, self.name);
        let output = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .env("NC_RUN_ID", &ctx.run_id)
            .env("NC_RUN_AT", format_timestamp(&ctx.run_at))
            .env("NC_CADENCE", ctx.cadence.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                FetchFailure::new(
                    FetchFailureKind::Process,
                    format!("failed to start '{}': {}", self.program, e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let trimmed = stderr.trim();
            let tail: String = trimmed
                .chars()
                .rev()
                .take(STDERR_TAIL_CHARS)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return Err(FetchFailure::new(
                FetchFailureKind::Process,
                format!("'{}' exited with {}: {}", self.program, output.status, tail),
            ));
        }
        Ok(output.stdout)
    }

    async fn write_family(
        &self,
        ctx: &FetchContext,
        family: &FamilyName,
        store: &Arc<dyn ObservationRepositoryTrait>,
        stdout: &[u8],
    ) -> std::result::Result<(), FetchFailure> {
        let parsed: BTreeMap<String, Option<f64>> = serde_json::from_slice(stdout)
            .map_err(|e| FetchFailure::parse(format!("invalid JSON from '{}': {}", self.program, e)))?;
        let values: BTreeMap<String, f64> = parsed
            .into_iter()
            .filter_map(|(column, value)| value.map(|v| (column, v)))
            .collect();
        if values.is_empty() {
            warn!("Fetcher {} produced no values", self.name);
            return Ok(());
        }
        let row = NewObservationRow::new(family.clone(), ctx.run_at, values)?;
        store.append(row).await?;
        Ok(())
    }

    async fn write_real_estate(
        &self,
        ctx: &FetchContext,
        store: &Arc<dyn RealEstateRepositoryTrait>,
        stdout: &[u8],
    ) -> std::result::Result<(), FetchFailure> {
        let lines: Vec<AppraisalLine> = serde_json::from_slice(stdout)
            .map_err(|e| FetchFailure::parse(format!("invalid JSON from '{}': {}", self.program, e)))?;
        let appraisals = lines
            .into_iter()
            .map(|line| {
                let site: AppraisalSite = line.site.parse()?;
                NewAppraisal::new(ctx.run_at, line.property, site, line.value)
            })
            .collect::<Result<Vec<_>>>()?;
        store.append_appraisals(appraisals).await?;
        Ok(())
    }
}

#[async_trait]
impl FetcherUnit for CommandFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn prepare(&self) -> std::result::Result<(), FetchFailure> {
        match &self.sink {
            Sink::Family { family, store } => {
                store.ensure_family(family, &self.columns).await?;
                Ok(())
            }
            Sink::RealEstate { .. } => Ok(()),
        }
    }

    async fn invoke(&self, ctx: &FetchContext) -> std::result::Result<(), FetchFailure> {
        let stdout = self.run_process(ctx).await?;
        match &self.sink {
            Sink::Family { family, store } => self.write_family(ctx, family, store, &stdout).await,
            Sink::RealEstate { store } => self.write_real_estate(ctx, store, &stdout).await,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cadence::Cadence;
    use crate::test_support::{InMemoryObservations, InMemoryRealEstate};
    use chrono::{TimeZone, Utc};

    fn ctx() -> FetchContext {
        FetchContext::new(Cadence::Hourly, Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap())
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_family_output_is_appended_at_run_timestamp() {
        let store = Arc::new(InMemoryObservations::default());
        let family = FamilyName::parse("forex").unwrap();
        store
            .ensure_family(&family, &["CHFUSD".to_string(), "SGDUSD".to_string()])
            .await
            .unwrap();
        let fetcher = CommandFetcher::for_family(
            "forex",
            sh(r#"echo '{"CHFUSD": 1.13, "SGDUSD": null}'"#),
            family.clone(),
            store.clone(),
        )
        .unwrap();

        let ctx = ctx();
        fetcher.invoke(&ctx).await.unwrap();

        let row = store.latest_row_as_of(&family, ctx.run_at).unwrap().unwrap();
        assert_eq!(row.timestamp, ctx.run_at);
        assert_eq!(row.value("CHFUSD"), Some(1.13));
        assert_eq!(row.value("SGDUSD"), None);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_process_failure_with_stderr() {
        let store = Arc::new(InMemoryObservations::default());
        let fetcher = CommandFetcher::for_family(
            "broken",
            sh("echo 'session expired' >&2; exit 3"),
            FamilyName::parse("broken").unwrap(),
            store,
        )
        .unwrap();

        let failure = fetcher.invoke(&ctx()).await.unwrap_err();
        assert_eq!(failure.kind, FetchFailureKind::Process);
        assert!(failure.cause.contains("session expired"));
    }

    #[tokio::test]
    async fn test_garbage_output_is_parse_failure() {
        let store = Arc::new(InMemoryObservations::default());
        let fetcher = CommandFetcher::for_family(
            "garbage",
            sh("echo '<html>'"),
            FamilyName::parse("garbage").unwrap(),
            store,
        )
        .unwrap();

        let failure = fetcher.invoke(&ctx()).await.unwrap_err();
        assert_eq!(failure.kind, FetchFailureKind::Parse);
    }

    #[tokio::test]
    async fn test_unknown_column_is_schema_failure() {
        let store = Arc::new(InMemoryObservations::default());
        let family = FamilyName::parse("forex").unwrap();
        store.ensure_family(&family, &["CHFUSD".to_string()]).await.unwrap();
        let fetcher = CommandFetcher::for_family(
            "forex",
            sh(r#"echo '{"EURUSD": 1.08}'"#),
            family,
            store,
        )
        .unwrap();

        let failure = fetcher.invoke(&ctx()).await.unwrap_err();
        assert_eq!(failure.kind, FetchFailureKind::Schema);
    }

    #[tokio::test]
    async fn test_real_estate_output() {
        let store = Arc::new(InMemoryRealEstate::default());
        let fetcher = CommandFetcher::for_real_estate(
            "homes",
            sh(r#"echo '[{"name": "Home", "site": "redfin", "value": 500000},
                         {"name": "Home", "site": "Zillow", "value": 520000}]'"#),
            store.clone(),
        )
        .unwrap();

        fetcher.invoke(&ctx()).await.unwrap();

        let valuations = store.list_valuations(None).unwrap();
        assert_eq!(valuations.len(), 1);
        assert_eq!(valuations[0].value(), Some(510_000.0));
    }

    #[tokio::test]
    async fn test_bad_appraisal_line_stores_nothing() {
        let store = Arc::new(InMemoryRealEstate::default());
        let fetcher = CommandFetcher::for_real_estate(
            "homes",
            sh(r#"echo '[{"name": "Home", "site": "Redfin", "value": 500000},
                         {"name": "Home", "site": "Trulia", "value": 490000}]'"#),
            store.clone(),
        )
        .unwrap();

        let failure = fetcher.invoke(&ctx()).await.unwrap_err();
        assert_eq!(failure.kind, FetchFailureKind::Parse);
        assert!(store.list_valuations(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_creates_family_with_configured_columns() {
        let store = Arc::new(InMemoryObservations::default());
        let family = FamilyName::parse("etfs").unwrap();
        let fetcher = CommandFetcher::for_family("etfs", sh("true"), family.clone(), store.clone())
            .unwrap()
            .with_columns(vec!["VT".to_string(), "VXUS".to_string()]);

        fetcher.prepare().await.unwrap();
        fetcher.prepare().await.unwrap();

        assert_eq!(store.list_columns(&family).unwrap(), vec!["VT".to_string(), "VXUS".to_string()]);
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let store = Arc::new(InMemoryRealEstate::default());
        assert!(CommandFetcher::for_real_estate("homes", vec![], store).is_err());
    }
}
