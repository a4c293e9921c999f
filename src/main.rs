mod cli;
mod config;
mod error;
mod kopis;
mod orchestrator;
mod pipeline;
mod record;
mod status;
mod store;
mod throttle;
mod ui;

use std::process::ExitCode;

use anyhow::Result;
use chrono::{Local, Utc};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::IngestConfig;
use error::IngestError;
use kopis::KopisClient;
use orchestrator::{Orchestrator, RunReport, RunSettings};
use store::{MemoryStore, RecordStore, SqliteStore, StoreStats};
use throttle::IntervalThrottle;
use ui::RunProgress;

/// `database_url` value selecting the in-process store.
const MEMORY_DATABASE: &str = "memory";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "invocation failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = IngestConfig::load(&cli.config)?;
    if let Some(url) = cli.database {
        config.database_url = url;
    }

    if config.database_url == MEMORY_DATABASE {
        dispatch(cli.command, &config, MemoryStore::new()).await
    } else {
        let store = SqliteStore::connect(&config.database_url).await?;
        dispatch(cli.command, &config, store).await
    }
}

async fn dispatch<R: RecordStore>(command: Command, config: &IngestConfig, store: R) -> Result<()> {
    let today = Local::now().date_naive();
    let started_at = Utc::now();

    match command {
        Command::Stats => {
            let stats = StoreStats::collect(&store).await?;
            ui::print_stats(&stats);
            Ok(())
        }
        Command::Sync => {
            let orch = orchestrator(config, store)?;
            let progress = RunProgress::start("Syncing listings");
            let result = orch
                .run_list_sync(today)
                .await
                .map(|s| RunReport::new(started_at, Some(s), None));
            finish(&progress, result)
        }
        Command::Backfill { limit } => {
            let orch = orchestrator(config, store)?;
            let progress = RunProgress::start("Backfilling details");
            let result = orch
                .run_backfill(limit)
                .await
                .map(|b| RunReport::new(started_at, None, Some(b)));
            finish(&progress, result)
        }
        Command::Run { limit } => {
            let orch = orchestrator(config, store)?;
            let progress = RunProgress::start("Syncing listings and backfilling details");
            finish(&progress, orch.run_all(today, limit).await)
        }
    }
}

// Wires the upstream client and throttle; only the pipeline commands need an API key.
fn orchestrator<R: RecordStore>(
    config: &IngestConfig,
    store: R,
) -> Result<Orchestrator<KopisClient, R, IntervalThrottle>> {
    Ok(Orchestrator::new(
        KopisClient::new(config)?,
        store,
        IntervalThrottle::from_millis(config.detail_interval_ms),
        RunSettings::from_config(config),
    ))
}

fn finish(progress: &RunProgress, result: Result<RunReport, IngestError>) -> Result<()> {
    match result {
        Ok(report) => {
            progress.complete(&report);
            progress.print_report(&report);
            Ok(())
        }
        Err(e) => {
            progress.fail("ingestion run failed");
            Err(e.into())
        }
    }
}
