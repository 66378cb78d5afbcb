mod cli;
mod commands;
mod config;
mod main_lib;

use clap::Parser;
use cli::Cli;
use config::Config;
use main_lib::{build_state, init_tracing};
use networth_core::constants::{EXIT_LOCK_CONTENTION, EXIT_RUN_FAILED};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => exit_code_for(&err),
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = Config::from_env()?;
    let state = build_state(&config).await?;
    commands::dispatch(cli.command, &state, &config).await
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<networth_core::Error>() {
        Some(networth_core::Error::LockContention { .. }) => {
            tracing::warn!("{}", err);
            EXIT_LOCK_CONTENTION
        }
        _ => {
            tracing::error!("{:#}", err);
            EXIT_RUN_FAILED
        }
    }
}
