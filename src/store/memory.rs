use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RecordFilter, RecordStore, StoreError, UpsertOutcome, require_key};
use crate::record::{DetailUpdate, ListingUpdate, PerformanceRecord};

/// In-process store. Records keep insertion order, which is the order `find` returns.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<PerformanceRecord>,
    by_external_id: HashMap<String, usize>,
    // Run leases: name to (holder, expiry).
    leases: HashMap<String, (Uuid, DateTime<Utc>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutates the engagement counters of a record, as the catalog service would.
    #[cfg(test)]
    pub async fn with_engagement(
        &self,
        external_id: &str,
        f: impl FnOnce(&mut crate::record::Engagement),
    ) {
        let mut inner = self.inner.write().await;
        if let Some(&idx) = inner.by_external_id.get(external_id) {
            f(&mut inner.records[idx].engagement);
        }
    }
}

impl RecordStore for MemoryStore {
    async fn upsert_listing(&self, update: &ListingUpdate) -> Result<UpsertOutcome, StoreError> {
        require_key(update)?;
        let mut inner = self.inner.write().await;
        if let Some(&idx) = inner.by_external_id.get(&update.external_id) {
            inner.records[idx].apply_listing(update);
            return Ok(UpsertOutcome::Updated);
        }
        let idx = inner.records.len();
        inner.records.push(PerformanceRecord::from_listing(update));
        inner.by_external_id.insert(update.external_id.clone(), idx);
        Ok(UpsertOutcome::Inserted)
    }

    async fn find(
        &self,
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<PerformanceRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn apply_detail(&self, id: Uuid, update: &DetailUpdate) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.apply_detail(update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.records.iter().filter(|r| filter.matches(r)).count() as u64)
    }

    #[cfg(test)]
    async fn get(&self, external_id: &str) -> Result<Option<PerformanceRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_external_id
            .get(external_id)
            .map(|&idx| inner.records[idx].clone()))
    }

    async fn acquire_lease(
        &self,
        name: &str,
        holder: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        if let Some((owner, until)) = inner.leases.get(name)
            && *owner != holder
            && *until > now
        {
            return Ok(false);
        }
        inner.leases.insert(name.to_string(), (holder, expires_at));
        Ok(true)
    }

    async fn release_lease(&self, name: &str, holder: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.leases.get(name).is_some_and(|(owner, _)| *owner == holder) {
            inner.leases.remove(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LifecycleStatus;
    use crate::record::fixtures::{detail_update, listing_update};

    #[tokio::test]
    async fn upsert_inserts_then_updates() {
        let store = MemoryStore::new();
        let first = store
            .upsert_listing(&listing_update("PF1", LifecycleStatus::Active))
            .await
            .unwrap();
        let second = store
            .upsert_listing(&listing_update("PF1", LifecycleStatus::Archived))
            .await
            .unwrap();

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Updated);
        assert_eq!(store.count(&RecordFilter::all()).await.unwrap(), 1);
        let record = store.get("PF1").await.unwrap().unwrap();
        assert_eq!(record.status, LifecycleStatus::Archived);
    }

    #[tokio::test]
    async fn upsert_keeps_id_and_crawl_time() {
        let store = MemoryStore::new();
        store
            .upsert_listing(&listing_update("PF1", LifecycleStatus::Active))
            .await
            .unwrap();
        let before = store.get("PF1").await.unwrap().unwrap();
        store
            .upsert_listing(&listing_update("PF1", LifecycleStatus::Active))
            .await
            .unwrap();
        let after = store.get("PF1").await.unwrap().unwrap();

        assert_eq!(before.id, after.id);
        assert_eq!(before.crawled_at, after.crawled_at);
        assert!(after.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn find_respects_order_and_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .upsert_listing(&listing_update(&format!("PF{i}"), LifecycleStatus::Active))
                .await
                .unwrap();
        }
        let found = store.find(&RecordFilter::all(), 3).await.unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["PF0", "PF1", "PF2"]);
    }

    #[tokio::test]
    async fn blank_key_is_rejected() {
        let store = MemoryStore::new();
        let result = store
            .upsert_listing(&listing_update("  ", LifecycleStatus::Active))
            .await;
        assert!(matches!(result, Err(StoreError::Rejected { .. })));
        assert_eq!(store.count(&RecordFilter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lease_excludes_other_holders_until_released() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let until = Utc::now() + chrono::Duration::minutes(5);

        assert!(store.acquire_lease("backfill", a, until).await.unwrap());
        assert!(!store.acquire_lease("backfill", b, until).await.unwrap());
        assert!(store.acquire_lease("sync", b, until).await.unwrap());

        // Only the owner can release.
        store.release_lease("backfill", b).await.unwrap();
        assert!(!store.acquire_lease("backfill", b, until).await.unwrap());
        store.release_lease("backfill", a).await.unwrap();
        assert!(store.acquire_lease("backfill", b, until).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over() {
        let store = MemoryStore::new();
        let stale = Utc::now() - chrono::Duration::seconds(1);
        assert!(store.acquire_lease("backfill", Uuid::new_v4(), stale).await.unwrap());

        let until = Utc::now() + chrono::Duration::minutes(5);
        assert!(store.acquire_lease("backfill", Uuid::new_v4(), until).await.unwrap());
    }

    #[tokio::test]
    async fn apply_detail_unknown_id_is_false() {
        let store = MemoryStore::new();
        let applied = store
            .apply_detail(Uuid::new_v4(), &detail_update("FC1"))
            .await
            .unwrap();
        assert!(!applied);
    }
}
