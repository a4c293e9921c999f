use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::{RecordFilter, RecordStore, StoreError, UpsertOutcome, require_key};
use crate::record::{
    Detail, DetailUpdate, Engagement, LifecycleStatus, Listing, ListingUpdate, PerformanceRecord,
    RECORD_SCHEMA_VERSION,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS performances (
    id              TEXT PRIMARY KEY,
    external_id     TEXT NOT NULL UNIQUE,
    name            TEXT NOT NULL,
    genre           TEXT,
    state_label     TEXT,
    start_date      TEXT NOT NULL,
    end_date        TEXT NOT NULL,
    venue_name      TEXT NOT NULL,
    poster          TEXT,
    area            TEXT,
    facility_id     TEXT,
    price_guidance  TEXT,
    synopsis        TEXT,
    runtime         TEXT,
    status          TEXT NOT NULL DEFAULT 'ACTIVE',
    view_count      INTEGER NOT NULL DEFAULT 0,
    like_count      INTEGER NOT NULL DEFAULT 0,
    average_rating  REAL NOT NULL DEFAULT 0,
    review_count    INTEGER NOT NULL DEFAULT 0,
    crawled_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_performances_backfill
    ON performances (status, facility_id);
CREATE TABLE IF NOT EXISTS run_locks (
    name        TEXT PRIMARY KEY,
    holder      TEXT NOT NULL,
    expires_at  INTEGER NOT NULL
);
"#;

// Counters and detail columns are deliberately absent from the conflict branch.
const UPSERT_LISTING: &str = r#"
INSERT INTO performances (
    id, external_id, name, genre, state_label, start_date, end_date,
    venue_name, poster, area, status, crawled_at, updated_at
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (external_id) DO UPDATE SET
    name        = excluded.name,
    genre       = excluded.genre,
    state_label = excluded.state_label,
    start_date  = excluded.start_date,
    end_date    = excluded.end_date,
    venue_name  = excluded.venue_name,
    poster      = excluded.poster,
    area        = excluded.area,
    status      = excluded.status,
    updated_at  = excluded.updated_at
RETURNING id
"#;

const APPLY_DETAIL: &str = r#"
UPDATE performances
SET facility_id = ?, price_guidance = ?, synopsis = ?, runtime = ?, updated_at = ?
WHERE id = ?
"#;

// Takes a free lease, or steals one whose holder let it expire. Expiry is in
// unix milliseconds.
const ACQUIRE_LEASE: &str = r#"
INSERT INTO run_locks (name, holder, expires_at)
VALUES (?, ?, ?)
ON CONFLICT (name) DO UPDATE SET
    holder     = excluded.holder,
    expires_at = excluded.expires_at
WHERE run_locks.holder = excluded.holder OR run_locks.expires_at <= ?
"#;

const RELEASE_LEASE: &str = "DELETE FROM run_locks WHERE name = ? AND holder = ?";

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and ensures the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let in_memory = url.contains(":memory:");
        // Each in-memory connection is its own database, so keep exactly one alive.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        debug!("performances schema ready");
        Ok(())
    }
}

fn where_clause(filter: &RecordFilter) -> String {
    let mut clauses = Vec::new();
    if filter.status.is_some() {
        clauses.push("status = ?");
    }
    if filter.missing_detail {
        clauses.push("facility_id IS NULL");
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn corrupt(row: &SqliteRow, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        id: row.try_get::<String, _>("id").unwrap_or_default(),
        reason: reason.to_string(),
    }
}

fn record_from_row(row: &SqliteRow) -> Result<PerformanceRecord, StoreError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    Ok(PerformanceRecord {
        schema_version: RECORD_SCHEMA_VERSION,
        id: Uuid::parse_str(&id).map_err(|e| corrupt(row, e))?,
        external_id: row.try_get("external_id")?,
        listing: Listing {
            name: row.try_get("name")?,
            genre: row.try_get("genre")?,
            state_label: row.try_get("state_label")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            venue_name: row.try_get("venue_name")?,
            poster: row.try_get("poster")?,
            area: row.try_get("area")?,
        },
        detail: Detail {
            facility_id: row.try_get("facility_id")?,
            price_guidance: row.try_get("price_guidance")?,
            synopsis: row.try_get("synopsis")?,
            runtime: row.try_get("runtime")?,
        },
        status: status
            .parse::<LifecycleStatus>()
            .map_err(|e| corrupt(row, e))?,
        engagement: Engagement {
            view_count: row.try_get("view_count")?,
            like_count: row.try_get("like_count")?,
            average_rating: row.try_get("average_rating")?,
            review_count: row.try_get("review_count")?,
        },
        crawled_at: row.try_get("crawled_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl RecordStore for SqliteStore {
    async fn upsert_listing(&self, update: &ListingUpdate) -> Result<UpsertOutcome, StoreError> {
        require_key(update)?;
        let new_id = Uuid::new_v4().to_string();
        let listing = &update.listing;
        let row = sqlx::query(UPSERT_LISTING)
            .bind(&new_id)
            .bind(&update.external_id)
            .bind(&listing.name)
            .bind(&listing.genre)
            .bind(&listing.state_label)
            .bind(&listing.start_date)
            .bind(&listing.end_date)
            .bind(&listing.venue_name)
            .bind(&listing.poster)
            .bind(&listing.area)
            .bind(update.status.as_str())
            .bind(update.updated_at)
            .bind(update.updated_at)
            .fetch_one(&self.pool)
            .await?;
        let stored_id: String = row.try_get("id")?;
        Ok(if stored_id == new_id {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn find(
        &self,
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<PerformanceRecord>, StoreError> {
        let sql = format!(
            "SELECT * FROM performances{} ORDER BY rowid LIMIT ?",
            where_clause(filter)
        );
        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn apply_detail(&self, id: Uuid, update: &DetailUpdate) -> Result<bool, StoreError> {
        let detail = &update.detail;
        let result = sqlx::query(APPLY_DETAIL)
            .bind(&detail.facility_id)
            .bind(&detail.price_guidance)
            .bind(&detail.synopsis)
            .bind(&detail.runtime)
            .bind(update.updated_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM performances{}", where_clause(filter));
        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        let row = query.fetch_one(&self.pool).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    #[cfg(test)]
    async fn get(&self, external_id: &str) -> Result<Option<PerformanceRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM performances WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn acquire_lease(
        &self,
        name: &str,
        holder: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(ACQUIRE_LEASE)
            .bind(name)
            .bind(holder.to_string())
            .bind(expires_at.timestamp_millis())
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        let acquired = result.rows_affected() > 0;
        debug!(name, %holder, acquired, "run lease");
        Ok(acquired)
    }

    async fn release_lease(&self, name: &str, holder: Uuid) -> Result<(), StoreError> {
        sqlx::query(RELEASE_LEASE)
            .bind(name)
            .bind(holder.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
