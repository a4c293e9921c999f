use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::Deadline;
use crate::kopis::PerformanceSource;
use crate::record::ListingUpdate;
use crate::status::classify;
use crate::store::{RecordStore, UpsertOutcome};

/// Inputs of one listing sync.
#[derive(Debug, Clone)]
pub struct ListSyncPlan<'a> {
    pub state_codes: &'a [String],
    pub today: NaiveDate,
    pub window_days: u32,
}

impl ListSyncPlan<'_> {
    /// `[today, today + window_days]`.
    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        let end = self
            .today
            .checked_add_days(Days::new(u64::from(self.window_days)))
            .unwrap_or(NaiveDate::MAX);
        (self.today, end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateSyncOutcome {
    pub state_code: String,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

impl StateSyncOutcome {
    pub fn saved(&self) -> usize {
        self.inserted + self.updated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListSyncSummary {
    pub states: Vec<StateSyncOutcome>,
    /// Items successfully upserted across all state codes.
    pub saved: usize,
    pub failed: usize,
    /// The deadline passed before every state code was visited.
    pub interrupted: bool,
}

/// Pulls one page per tracked state code and upserts every item.
///
/// Nothing is deleted: records that drop out of the upstream listing stay as
/// they were. A failed list call contributes zero items; a failed write skips
/// that item only.
pub async fn sync_listings(
    source: &impl PerformanceSource,
    store: &impl RecordStore,
    plan: &ListSyncPlan<'_>,
    deadline: Deadline,
) -> ListSyncSummary {
    let (start, end) = plan.window();
    info!(%start, %end, states = ?plan.state_codes, "listing sync started");

    let mut summary = ListSyncSummary::default();
    for state_code in plan.state_codes {
        if deadline.expired() {
            warn!(state_code = %state_code, "deadline reached, skipping remaining state codes");
            summary.interrupted = true;
            break;
        }

        let items = source.fetch_list(state_code, start, end).await;
        let mut outcome = StateSyncOutcome {
            state_code: state_code.clone(),
            fetched: items.len(),
            ..StateSyncOutcome::default()
        };

        for item in &items {
            let Some(external_id) = item.external_id() else {
                warn!(state_code = %state_code, name = %item.prfnm, "item without external id");
                outcome.failed += 1;
                continue;
            };

            let listing = item.to_listing();
            let status = classify(&listing.end_date, plan.today);
            let update = ListingUpdate {
                external_id: external_id.to_string(),
                listing,
                status,
                updated_at: Utc::now(),
            };

            match store.upsert_listing(&update).await {
                Ok(UpsertOutcome::Inserted) => {
                    debug!(external_id, %status, "inserted performance");
                    outcome.inserted += 1;
                }
                Ok(UpsertOutcome::Updated) => {
                    debug!(external_id, %status, "updated performance");
                    outcome.updated += 1;
                }
                Err(e) => {
                    warn!(external_id, name = %update.listing.name, error = %e, "failed to save performance");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            state_code = %state_code,
            fetched = outcome.fetched,
            inserted = outcome.inserted,
            updated = outcome.updated,
            failed = outcome.failed,
            "state code synced"
        );
        summary.saved += outcome.saved();
        summary.failed += outcome.failed;
        summary.states.push(outcome);
    }

    info!(saved = summary.saved, failed = summary.failed, "listing sync finished");
    summary
}
