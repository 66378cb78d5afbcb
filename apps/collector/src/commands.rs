use chrono::{DateTime, Utc};
use networth_core::cadence::{Cadence, DataDirLock};
use networth_core::constants::{EXIT_RUN_FAILED, EXIT_SUCCESS};
use networth_core::observations::{validate_column_name, FamilyName};
use networth_core::retry::{run_hourly_with_daily_retry, DailyRetry};
use serde::Serialize;

use crate::cli::Command;
use crate::config::Config;
use crate::main_lib::AppState;

/// Runs one subcommand and returns the process exit code.
pub async fn dispatch(command: Command, state: &AppState, config: &Config) -> anyhow::Result<i32> {
    match command {
        Command::Run { cadence, at } => run_cadence(state, cadence, at).await,
        Command::Hourly => run_hourly(state).await,
        Command::NeedsRun => {
            let decision = state.planner.evaluate(Utc::now()).await;
            print_json(&decision)?;
            Ok(EXIT_SUCCESS)
        }
        Command::Aggregate { dry_run } => aggregate(state, config, dry_run).await,
        Command::AddColumn { family, column } => add_column(state, config, &family, &column).await,
        Command::Failures { unresolved } => {
            let failures: Vec<_> = state
                .runs
                .last_failures()?
                .into_iter()
                .filter(|f| !unresolved || !f.is_resolved())
                .collect();
            print_json(&failures)?;
            Ok(EXIT_SUCCESS)
        }
        Command::Latest => {
            let change = state
                .aggregator
                .latest_change(Utc::now(), &config.timezone)?;
            print_json(&change)?;
            Ok(EXIT_SUCCESS)
        }
    }
}

async fn run_cadence(
    state: &AppState,
    cadence: Cadence,
    at: Option<DateTime<Utc>>,
) -> anyhow::Result<i32> {
    let plan = state.plan(cadence);
    let outcome = match at {
        Some(at) => state.orchestrator.run_cadence_at(&plan, at).await?,
        None => state.orchestrator.run_cadence(&plan).await?,
    };
    println!("{}", outcome.summary());
    Ok(outcome.exit_code())
}

async fn run_hourly(state: &AppState) -> anyhow::Result<i32> {
    let report = run_hourly_with_daily_retry(
        &state.orchestrator,
        &state.plan(Cadence::Hourly),
        &state.plan(Cadence::Daily),
        &state.planner,
    )
    .await?;

    println!("{}", report.hourly.summary());
    match &report.daily_retry {
        DailyRetry::NotNeeded => println!("daily run up to date"),
        DailyRetry::Ran(outcome) => println!("{}", outcome.summary()),
        DailyRetry::Failed(err) => println!("daily retry did not run: {}", err),
    }
    Ok(report.exit_code())
}

async fn aggregate(state: &AppState, config: &Config, dry_run: bool) -> anyhow::Result<i32> {
    let now = Utc::now();
    let snapshot_at = Cadence::Hourly.period_start(now, &config.timezone);

    if dry_run {
        let report = state.aggregator.compute(now, snapshot_at)?;
        print_json(&report)?;
        return Ok(EXIT_SUCCESS);
    }

    let _guard = DataDirLock::new(&config.data_dir)
        .acquire(config.lock_timeout, config.lock_poll_interval)
        .await?;
    match state.aggregator.aggregate(now, snapshot_at).await {
        Ok(report) => {
            print_json(&report)?;
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            tracing::error!("History aggregation failed: {}", e);
            Ok(EXIT_RUN_FAILED)
        }
    }
}

async fn add_column(
    state: &AppState,
    config: &Config,
    family: &str,
    column: &str,
) -> anyhow::Result<i32> {
    let family = FamilyName::parse(family)?;
    validate_column_name(column)?;

    let _guard = DataDirLock::new(&config.data_dir)
        .acquire(config.lock_timeout, config.lock_poll_interval)
        .await?;
    if state.observations.add_column(&family, column).await? {
        tracing::info!("Added column {} to {}", column, family);
    } else {
        tracing::info!("Column {} already exists in {}", column, family);
    }
    Ok(EXIT_SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
