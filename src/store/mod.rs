//! Persistence for performance records.
//!
//! [`RecordStore`] is the only shared state of the pipeline. Every write is
//! field-scoped and atomic per record; nothing here locks across records.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::record::{DetailUpdate, LifecycleStatus, ListingUpdate, PerformanceRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("write rejected for {external_id}: {reason}")]
    Rejected { external_id: String, reason: String },
}

/// Whether an upsert created the record or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Predicate for `find` and `count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub status: Option<LifecycleStatus>,
    /// Only records whose completeness marker (facility id) is absent.
    pub missing_detail: bool,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: LifecycleStatus) -> Self {
        Self {
            status: Some(status),
            missing_detail: false,
        }
    }

    pub fn missing_detail() -> Self {
        Self {
            status: None,
            missing_detail: true,
        }
    }

    /// Backfill candidates: active and not yet enriched.
    pub fn backfill_candidates() -> Self {
        Self {
            status: Some(LifecycleStatus::Active),
            missing_detail: true,
        }
    }

    pub fn matches(&self, record: &PerformanceRecord) -> bool {
        self.status.is_none_or(|s| record.status == s)
            && (!self.missing_detail || record.needs_detail())
    }
}

/// The upsert key must be present; a blank one would collapse unrelated items.
fn require_key(update: &ListingUpdate) -> Result<(), StoreError> {
    if update.external_id.trim().is_empty() {
        return Err(StoreError::Rejected {
            external_id: update.external_id.clone(),
            reason: "blank external id".to_string(),
        });
    }
    Ok(())
}

pub trait RecordStore {
    /// Inserts or refreshes the listing fields of the record keyed by external id.
    /// Insert-time defaults (id, zero counters, crawl time) apply only on creation.
    async fn upsert_listing(&self, update: &ListingUpdate) -> Result<UpsertOutcome, StoreError>;

    /// Records matching `filter`, in insertion order, at most `limit`.
    async fn find(
        &self,
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<PerformanceRecord>, StoreError>;

    /// Writes the detail fields of the record with internal id `id`.
    /// Returns `false` if no such record exists.
    async fn apply_detail(&self, id: Uuid, update: &DetailUpdate) -> Result<bool, StoreError>;

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError>;

    #[cfg(test)]
    async fn get(&self, external_id: &str) -> Result<Option<PerformanceRecord>, StoreError>;

    /// Takes the named run lease for `holder` until `expires_at`.
    ///
    /// Returns `false` while another holder owns an unexpired lease. The lease
    /// lives in the store so that separate processes sharing it exclude each other.
    async fn acquire_lease(
        &self,
        name: &str,
        holder: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Drops the lease if `holder` still owns it.
    async fn release_lease(&self, name: &str, holder: Uuid) -> Result<(), StoreError>;
}

/// Snapshot of how much of the catalog is stored and enriched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub active: u64,
    pub needs_detail: u64,
}

impl StoreStats {
    pub async fn collect(store: &impl RecordStore) -> Result<Self, StoreError> {
        Ok(Self {
            total: store.count(&RecordFilter::all()).await?,
            active: store
                .count(&RecordFilter::with_status(LifecycleStatus::Active))
                .await?,
            needs_detail: store.count(&RecordFilter::missing_detail()).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PerformanceRecord;
    use crate::record::fixtures::{detail_update, listing_update};

    #[test]
    fn filter_matches() {
        let mut active = PerformanceRecord::from_listing(&listing_update("PF1", LifecycleStatus::Active));
        let archived =
            PerformanceRecord::from_listing(&listing_update("PF2", LifecycleStatus::Archived));

        assert!(RecordFilter::all().matches(&archived));
        assert!(RecordFilter::backfill_candidates().matches(&active));
        assert!(!RecordFilter::backfill_candidates().matches(&archived));
        assert!(RecordFilter::missing_detail().matches(&archived));

        active.apply_detail(&detail_update("FC1"));
        assert!(!RecordFilter::backfill_candidates().matches(&active));
        assert!(RecordFilter::with_status(LifecycleStatus::Active).matches(&active));
    }

    #[tokio::test]
    async fn stats_counts_by_filter() {
        let store = MemoryStore::new();
        store
            .upsert_listing(&listing_update("PF1", LifecycleStatus::Active))
            .await
            .unwrap();
        store
            .upsert_listing(&listing_update("PF2", LifecycleStatus::Archived))
            .await
            .unwrap();
        let id = store.get("PF1").await.unwrap().unwrap().id;
        store.apply_detail(id, &detail_update("FC1")).await.unwrap();

        let stats = StoreStats::collect(&store).await.unwrap();
        assert_eq!(
            stats,
            StoreStats {
                total: 2,
                active: 1,
                needs_detail: 1
            }
        );
    }
}
