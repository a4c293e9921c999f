//! Configuration loaded from `kopis.toml`.
//!
//! [`IngestConfig`] holds every tunable of the two pipelines. Fields missing
//! from the file fall back to defaults. `KOPIS_API_KEY` and
//! `KOPIS_DATABASE_URL` take precedence over the file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::kopis::client::API_URL;

pub const DEFAULT_CONFIG_PATH: &str = "kopis.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// KOPIS service key.
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the performance endpoint; detail calls append `/{id}`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upstream state codes pulled by the list sync ("01" running, "02" upcoming).
    #[serde(default = "default_tracked_states")]
    pub tracked_states: Vec<String>,

    /// Length of the list-sync date window starting today.
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Row cap of the single page requested per state code.
    #[serde(default = "default_rows")]
    pub rows: u32,

    /// Minimum spacing between detail calls, in milliseconds.
    #[serde(default = "default_detail_interval_ms")]
    pub detail_interval_ms: u64,

    /// Records enriched per backfill invocation unless overridden.
    #[serde(default = "default_backfill_limit")]
    pub backfill_limit: usize,

    /// Per-request timeout for upstream calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for a whole invocation. Zero disables it.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// `sqlite://…` URL, or `memory` for a throwaway in-process store.
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

// Default endpoint: the public KOPIS performance API.
fn default_base_url() -> String {
    API_URL.to_string()
}

// Default state codes: "01" running and "02" upcoming.
fn default_tracked_states() -> Vec<String> {
    vec!["01".to_string(), "02".to_string()]
}

// Default list-sync window: 30 days from today.
fn default_window_days() -> u32 {
    30
}

// Default page size: 100 rows.
fn default_rows() -> u32 {
    100
}

// Default spacing between detail calls: 100ms.
fn default_detail_interval_ms() -> u64 {
    100
}

// Default backfill batch: 50 records.
fn default_backfill_limit() -> usize {
    50
}

// Default per-request timeout: 10s.
fn default_request_timeout_secs() -> u64 {
    10
}

// Default invocation deadline: 10 minutes.
fn default_run_timeout_secs() -> u64 {
    600
}

// Default database: `kopis.db` in the working directory.
fn default_database_url() -> String {
    "sqlite://kopis.db".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            tracked_states: default_tracked_states(),
            window_days: default_window_days(),
            rows: default_rows(),
            detail_interval_ms: default_detail_interval_ms(),
            backfill_limit: default_backfill_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            database_url: default_database_url(),
        }
    }
}

impl IngestConfig {
    /// Loads the configuration from `path`, using defaults if the file does not exist,
    /// then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;

        if let Ok(key) = std::env::var("KOPIS_API_KEY")
            && !key.is_empty()
        {
            config.api_key = key;
        }
        if let Ok(url) = std::env::var("KOPIS_DATABASE_URL")
            && !url.is_empty()
        {
            config.database_url = url;
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str::<IngestConfig>(&contents)
            .with_context(|| format!("parsing {}", path.display()))
    }
}
