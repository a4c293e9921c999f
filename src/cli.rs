//! Command-line interface for triggering the ingestion pipelines.
//!
//! Defines [`Cli`] with the [`Command`] subcommands (sync, backfill, run, stats)
//! and global flags (--config, --database, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// Keeps a local copy of KOPIS performance listings in sync.
#[derive(Debug, Parser)]
#[command(name = "kopis-ingest", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Database URL, overriding the configuration file and KOPIS_DATABASE_URL.
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Log pipeline progress at info level.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pulls current and upcoming listings and upserts them.
    Sync,

    /// Fills in venue, price, synopsis and runtime for incomplete active records.
    Backfill {
        /// Maximum number of records to enrich in this run.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Runs the listing sync followed by one backfill batch.
    Run {
        /// Maximum number of records to enrich in the backfill phase.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Shows how many records are stored, active, and still missing detail.
    Stats,
}
