use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use networth_core::cadence::Cadence;

#[derive(Debug, Parser)]
#[command(name = "networth-collector", version, about = "Runs collection cadences and maintains the history table")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one cadence's fetchers under the data directory lock.
    Run {
        cadence: Cadence,
        /// Run timestamp (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Run the hourly cadence, then the daily cadence if it needs a retry.
    Hourly,
    /// Report whether the daily cadence needs to run again.
    NeedsRun,
    /// Rebuild the history snapshot for the current hour.
    Aggregate {
        /// Compute and print the snapshot without writing it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Add a column for a newly tracked instrument.
    AddColumn { family: String, column: String },
    /// Most recent failure of every fetcher.
    Failures {
        /// Hide fetchers that have succeeded since their last failure.
        #[arg(long)]
        unresolved: bool,
    },
    /// Change between the last snapshot before today and the latest one.
    Latest,
}
