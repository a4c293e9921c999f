//! The performance record shared by both pipelines and the catalog query layer.
//!
//! Writes never replace a whole record. The list sync goes through
//! [`ListingUpdate`] and the backfill through [`DetailUpdate`]; each names
//! exactly the fields it owns, so the engagement counters are only ever
//! written by the catalog service.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version of the [`PerformanceRecord`] layout.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// Lifecycle status derived from a performance's end date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleStatus {
    Active,
    Archived,
    /// Reserved in the schema. No code path assigns it.
    Legacy,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Active => "ACTIVE",
            LifecycleStatus::Archived => "ARCHIVED",
            LifecycleStatus::Legacy => "LEGACY",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(LifecycleStatus::Active),
            "ARCHIVED" => Ok(LifecycleStatus::Archived),
            "LEGACY" => Ok(LifecycleStatus::Legacy),
            other => Err(format!("unknown lifecycle status: {other}")),
        }
    }
}

/// Counters owned by the catalog service (views, likes, ratings).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    pub view_count: i64,
    pub like_count: i64,
    pub average_rating: f64,
    pub review_count: i64,
}

/// Attributes overwritten on every list sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub name: String,
    pub genre: Option<String>,
    /// Upstream state label, e.g. "공연중".
    pub state_label: Option<String>,
    /// Dotted upstream date, `yyyy.MM.dd`.
    pub start_date: String,
    pub end_date: String,
    pub venue_name: String,
    pub poster: Option<String>,
    pub area: Option<String>,
}

/// Attributes written only by the detail backfill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detail {
    /// Venue facility id. Its presence marks the record as complete.
    pub facility_id: Option<String>,
    pub price_guidance: Option<String>,
    pub synopsis: Option<String>,
    pub runtime: Option<String>,
}

/// A stored performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub schema_version: u32,
    pub id: Uuid,
    pub external_id: String,
    pub listing: Listing,
    pub detail: Detail,
    pub status: LifecycleStatus,
    pub engagement: Engagement,
    pub crawled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PerformanceRecord {
    /// Builds the record inserted the first time an external id is seen.
    pub fn from_listing(update: &ListingUpdate) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            id: Uuid::new_v4(),
            external_id: update.external_id.clone(),
            listing: update.listing.clone(),
            detail: Detail::default(),
            status: update.status,
            engagement: Engagement::default(),
            crawled_at: update.updated_at,
            updated_at: update.updated_at,
        }
    }

    pub fn needs_detail(&self) -> bool {
        self.detail.facility_id.is_none()
    }

    /// Applies a list-sync write. Detail attributes and counters are untouched.
    pub fn apply_listing(&mut self, update: &ListingUpdate) {
        self.listing = update.listing.clone();
        self.status = update.status;
        self.updated_at = update.updated_at;
    }

    /// Applies a backfill write. Listing attributes and counters are untouched.
    pub fn apply_detail(&mut self, update: &DetailUpdate) {
        self.detail = update.detail.clone();
        self.updated_at = update.updated_at;
    }
}

/// Field-scoped upsert produced by the list sync, keyed by external id.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingUpdate {
    pub external_id: String,
    pub listing: Listing,
    pub status: LifecycleStatus,
    pub updated_at: DateTime<Utc>,
}

/// Field-scoped update produced by the detail backfill.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailUpdate {
    pub detail: Detail,
    pub updated_at: DateTime<Utc>,
}
