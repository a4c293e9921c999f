use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::Deadline;
use crate::kopis::PerformanceSource;
use crate::record::DetailUpdate;
use crate::store::{RecordFilter, RecordStore, StoreError};
use crate::throttle::Throttle;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    /// Candidates selected for this run (at most the limit).
    pub candidates: usize,
    /// Detail calls actually made.
    pub attempted: usize,
    pub enriched: usize,
    /// Upstream had nothing usable; the record stays eligible.
    pub skipped: usize,
    /// Detail fetched but the write failed.
    pub failed: usize,
    pub interrupted: bool,
}

/// Enriches up to `limit` active records that still lack a facility id.
///
/// Candidates are processed one at a time and every detail call waits on
/// `throttle` first, whatever happened to the previous one. Records the
/// upstream cannot supply are left untouched and picked up again next run;
/// there is no attempt counter. Only a failure to select candidates is
/// returned as an error.
pub async fn backfill_details(
    source: &impl PerformanceSource,
    store: &impl RecordStore,
    throttle: &impl Throttle,
    limit: usize,
    deadline: Deadline,
) -> Result<BackfillSummary, StoreError> {
    let candidates = store
        .find(&RecordFilter::backfill_candidates(), limit)
        .await?;

    let mut summary = BackfillSummary {
        candidates: candidates.len(),
        ..BackfillSummary::default()
    };
    if candidates.is_empty() {
        info!("no performances need detail");
        return Ok(summary);
    }
    info!(candidates = candidates.len(), "detail backfill started");

    for record in &candidates {
        if deadline.expired() {
            warn!(
                remaining = summary.candidates - summary.attempted,
                "deadline reached, leaving remaining candidates for the next run"
            );
            summary.interrupted = true;
            break;
        }

        throttle.acquire().await;
        summary.attempted += 1;
        let external_id = record.external_id.as_str();

        let Some(raw) = source.fetch_detail(external_id).await else {
            debug!(external_id, "no detail available, will retry next run");
            summary.skipped += 1;
            continue;
        };

        let detail = raw.to_detail();
        if detail.facility_id.is_none() {
            warn!(external_id, "detail has no facility id, will retry next run");
            summary.skipped += 1;
            continue;
        }

        let update = DetailUpdate {
            detail,
            updated_at: Utc::now(),
        };
        match store.apply_detail(record.id, &update).await {
            Ok(true) => {
                debug!(external_id, "detail saved");
                summary.enriched += 1;
            }
            Ok(false) => {
                warn!(external_id, id = %record.id, "record disappeared before detail write");
                summary.failed += 1;
            }
            Err(e) => {
                warn!(external_id, error = %e, "failed to save detail");
                summary.failed += 1;
            }
        }
    }

    info!(
        enriched = summary.enriched,
        skipped = summary.skipped,
        failed = summary.failed,
        "detail backfill finished"
    );
    Ok(summary)
}
