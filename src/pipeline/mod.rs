//! The two ingestion phases: listing sync and detail backfill.
//!
//! Both are strictly sequential and recover from failures at the smallest
//! unit they own (a state code, an item, a candidate).

mod backfill;
mod list_sync;

pub use backfill::{BackfillSummary, backfill_details};
pub use list_sync::{ListSyncPlan, ListSyncSummary, sync_listings};

use std::time::Duration;

use tokio::time::Instant;

/// Cooperative invocation deadline, checked before each external call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}
