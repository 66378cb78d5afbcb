use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono_tz::Tz;
use networth_core::cadence::OrchestratorSettings;
use networth_core::constants::{DEFAULT_LOCK_POLL_MS, DEFAULT_LOCK_TIMEOUT_SECS};

/// Runtime settings for the collector, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Pipeline definition (fetchers and history mapping).
    pub pipeline_path: PathBuf,
    pub lock_timeout: Duration,
    pub lock_poll_interval: Duration,
    pub max_concurrency: usize,
    pub timezone: Tz,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let data_dir = PathBuf::from(lookup("NC_DATA_DIR").unwrap_or_else(|| "./data".to_string()));
        let pipeline_path = lookup("NC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("pipeline.toml"));

        let lock_timeout_secs = parse_or(&lookup, "NC_LOCK_TIMEOUT_SECS", DEFAULT_LOCK_TIMEOUT_SECS)?;
        let lock_poll_ms = parse_or(&lookup, "NC_LOCK_POLL_MS", DEFAULT_LOCK_POLL_MS)?;
        let max_concurrency: usize = parse_or(&lookup, "NC_MAX_CONCURRENCY", 1)?;
        if max_concurrency == 0 {
            return Err(anyhow!("NC_MAX_CONCURRENCY must be at least 1"));
        }
        if lock_poll_ms == 0 {
            return Err(anyhow!("NC_LOCK_POLL_MS must be at least 1"));
        }

        let timezone = match lookup("NC_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| anyhow!("invalid NC_TIMEZONE '{}': {}", name, e))?,
            None => Tz::UTC,
        };

        Ok(Self {
            data_dir,
            pipeline_path,
            lock_timeout: Duration::from_secs(lock_timeout_secs),
            lock_poll_interval: Duration::from_millis(lock_poll_ms),
            max_concurrency,
            timezone,
        })
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            lock_timeout: self.lock_timeout,
            lock_poll_interval: self.lock_poll_interval,
            max_concurrency: self.max_concurrency,
            timezone: self.timezone,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid {} '{}'", key, raw)),
        None => Ok(default),
    }
}
