use std::sync::Arc;

use networth_core::cadence::{Cadence, CadenceOrchestrator, CadencePlan, DataDirLock};
use networth_core::config::PipelineConfig;
use networth_core::fetchers::FetcherUnit;
use networth_core::history::{HistoryAggregator, HistoryRepositoryTrait};
use networth_core::observations::ObservationRepositoryTrait;
use networth_core::real_estate::RealEstateRepositoryTrait;
use networth_core::retry::{RetryPlanner, RunLedgerProbe};
use networth_core::runs::RunRecordRepositoryTrait;
use networth_storage_sqlite::{
    Database, HistoryRepository, ObservationRepository, RealEstateRepository, RunRecordRepository,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub pipeline: PipelineConfig,
    pub observations: Arc<dyn ObservationRepositoryTrait>,
    pub runs: Arc<dyn RunRecordRepositoryTrait>,
    pub aggregator: Arc<HistoryAggregator>,
    pub orchestrator: CadenceOrchestrator,
    pub planner: RetryPlanner,
    pub fetchers: Vec<(Cadence, Arc<dyn FetcherUnit>)>,
}

impl AppState {
    pub fn plan(&self, cadence: Cadence) -> CadencePlan {
        self.pipeline.cadence_plan(cadence, &self.fetchers)
    }
}

pub fn init_tracing() {
    let log_format = std::env::var("NC_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let pipeline = if config.pipeline_path.exists() {
        PipelineConfig::load(&config.pipeline_path)?
    } else {
        tracing::warn!(
            "Pipeline config {} not found; running with no fetchers",
            config.pipeline_path.display()
        );
        PipelineConfig::default()
    };

    let database = Database::connect(&config.data_dir)?;
    tracing::info!("Data directory in use: {}", config.data_dir.display());
    if database.needs_migration()? {
        let _guard = DataDirLock::new(&config.data_dir)
            .acquire(config.lock_timeout, config.lock_poll_interval)
            .await?;
        tracing::info!("Applying pending migrations");
        database.migrate()?;
    }

    let observations: Arc<dyn ObservationRepositoryTrait> = Arc::new(ObservationRepository::new(
        database.pool.clone(),
        database.writer.clone(),
    ));
    let real_estate: Arc<dyn RealEstateRepositoryTrait> = Arc::new(RealEstateRepository::new(
        database.pool.clone(),
        database.writer.clone(),
    ));
    let runs: Arc<dyn RunRecordRepositoryTrait> = Arc::new(RunRecordRepository::new(
        database.pool.clone(),
        database.writer.clone(),
    ));
    let history: Arc<dyn HistoryRepositoryTrait> = Arc::new(HistoryRepository::new(
        database.pool.clone(),
        database.writer.clone(),
    ));

    let fetchers = pipeline.build_fetchers(observations.clone(), real_estate.clone())?;

    let aggregator = Arc::new(HistoryAggregator::new(
        observations.clone(),
        real_estate,
        history,
        pipeline.history_mapping()?,
    ));

    let orchestrator = CadenceOrchestrator::new(
        DataDirLock::new(&config.data_dir),
        runs.clone(),
        config.orchestrator_settings(),
    )
    .with_aggregator(aggregator.clone());

    let probe = Arc::new(RunLedgerProbe::new(
        runs.clone(),
        pipeline.fetcher_names(Cadence::Daily),
    ));
    let planner = RetryPlanner::new(runs.clone(), probe, config.timezone);

    Ok(AppState {
        pipeline,
        observations,
        runs,
        aggregator,
        orchestrator,
        planner,
        fetchers,
    })
}
