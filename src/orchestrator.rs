use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::kopis::PerformanceSource;
use crate::pipeline::{
    BackfillSummary, Deadline, ListSyncPlan, ListSyncSummary, backfill_details, sync_listings,
};
use crate::store::RecordStore;
use crate::throttle::Throttle;

const LIST_SYNC: &str = "listing sync";
const BACKFILL: &str = "detail backfill";

/// Lease lifetime for an invocation without a deadline.
const UNBOUNDED_LEASE: Duration = Duration::from_secs(6 * 60 * 60);

/// Slack past the deadline before a held lease counts as abandoned.
const LEASE_GRACE: Duration = Duration::from_secs(60);

/// Knobs the orchestrator needs from the configuration.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub tracked_states: Vec<String>,
    pub window_days: u32,
    pub backfill_limit: usize,
    /// Cooperative deadline for one invocation; `None` means unbounded.
    pub run_timeout: Option<Duration>,
}

impl RunSettings {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            tracked_states: config.tracked_states.clone(),
            window_days: config.window_days,
            backfill_limit: config.backfill_limit,
            run_timeout: (config.run_timeout_secs > 0)
                .then(|| Duration::from_secs(config.run_timeout_secs)),
        }
    }

    fn deadline(&self) -> Deadline {
        self.run_timeout.map_or_else(Deadline::none, Deadline::after)
    }

    /// How long a run lease stays valid if its holder dies without releasing it.
    fn lease_ttl(&self) -> Duration {
        self.run_timeout
            .map_or(UNBOUNDED_LEASE, |timeout| timeout.saturating_add(LEASE_GRACE))
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

/// Run-level totals for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_sync: Option<ListSyncSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backfill: Option<BackfillSummary>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        list_sync: Option<ListSyncSummary>,
        backfill: Option<BackfillSummary>,
    ) -> Self {
        let finished_at = Utc::now();
        Self {
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            list_sync,
            backfill,
        }
    }

    /// Units processed: listings saved plus records enriched.
    pub fn processed(&self) -> usize {
        self.list_sync.as_ref().map_or(0, |s| s.saved)
            + self.backfill.as_ref().map_or(0, |b| b.enriched)
    }
}

/// Sequences the listing sync and the detail backfill.
///
/// Each pipeline is guarded twice: an in-process mutex, and a lease in the
/// record store that other processes sharing the same database also take.
/// A second trigger of a pipeline already in flight is refused rather than
/// interleaved.
pub struct Orchestrator<S, R, T> {
    source: S,
    store: R,
    throttle: T,
    settings: RunSettings,
    // Identifies this orchestrator's leases in the store.
    holder: Uuid,
    list_lock: Mutex<()>,
    backfill_lock: Mutex<()>,
}

impl<S, R, T> Orchestrator<S, R, T>
where
    S: PerformanceSource,
    R: RecordStore,
    T: Throttle,
{
    pub fn new(source: S, store: R, throttle: T, settings: RunSettings) -> Self {
        Self {
            source,
            store,
            throttle,
            settings,
            holder: Uuid::new_v4(),
            list_lock: Mutex::new(()),
            backfill_lock: Mutex::new(()),
        }
    }

    /// Runs the listing sync for every tracked state code.
    pub async fn run_list_sync(&self, today: NaiveDate) -> Result<ListSyncSummary, IngestError> {
        self.list_sync_within(today, self.settings.deadline()).await
    }

    /// Runs one detail backfill batch of `limit` (or the configured default) records.
    pub async fn run_backfill(&self, limit: Option<usize>) -> Result<BackfillSummary, IngestError> {
        self.backfill_within(limit, self.settings.deadline()).await
    }

    /// Listing sync to completion, then a backfill batch, under one deadline.
    pub async fn run_all(
        &self,
        today: NaiveDate,
        limit: Option<usize>,
    ) -> Result<RunReport, IngestError> {
        let started_at = Utc::now();
        let deadline = self.settings.deadline();

        let list_sync = self.list_sync_within(today, deadline).await?;
        let backfill = self.backfill_within(limit, deadline).await?;

        let report = RunReport::new(started_at, Some(list_sync), Some(backfill));
        info!(
            processed = report.processed(),
            duration_ms = report.duration_ms,
            "ingestion run finished"
        );
        Ok(report)
    }

    async fn list_sync_within(
        &self,
        today: NaiveDate,
        deadline: Deadline,
    ) -> Result<ListSyncSummary, IngestError> {
        let plan = ListSyncPlan {
            state_codes: &self.settings.tracked_states,
            today,
            window_days: self.settings.window_days,
        };
        self.exclusive(&self.list_lock, LIST_SYNC, async {
            Ok(sync_listings(&self.source, &self.store, &plan, deadline).await)
        })
        .await
    }

    async fn backfill_within(
        &self,
        limit: Option<usize>,
        deadline: Deadline,
    ) -> Result<BackfillSummary, IngestError> {
        let limit = limit.unwrap_or(self.settings.backfill_limit);
        self.exclusive(&self.backfill_lock, BACKFILL, async {
            backfill_details(&self.source, &self.store, &self.throttle, limit, deadline)
                .await
                .map_err(|e| {
                    error!(error = %e, "detail backfill aborted");
                    IngestError::from(e)
                })
        })
        .await
    }

    /// Runs `pipeline` while holding both the local lock and the store lease `name`.
    async fn exclusive<O>(
        &self,
        lock: &Mutex<()>,
        name: &'static str,
        pipeline: impl Future<Output = Result<O, IngestError>>,
    ) -> Result<O, IngestError> {
        let _guard = lock
            .try_lock()
            .map_err(|_| IngestError::AlreadyRunning(name))?;

        let ttl = TimeDelta::from_std(self.settings.lease_ttl())
            .unwrap_or_else(|_| TimeDelta::hours(6));
        if !self
            .store
            .acquire_lease(name, self.holder, Utc::now() + ttl)
            .await?
        {
            warn!(pipeline = name, "run lease held by another process");
            return Err(IngestError::AlreadyRunning(name));
        }

        let result = pipeline.await;
        if let Err(e) = self.store.release_lease(name, self.holder).await {
            warn!(pipeline = name, error = %e, "failed to release run lease");
        }
        result
    }
}
