//! Database operations for the `deals` dedup store.

use chrono::{DateTime, Utc};
use dealwatch_core::Deal;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

const DEAL_COLUMNS: &str = "hash, merchant, face_value, price, discount_percent, source, url, \
                            first_seen, last_seen, appearances";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `deals` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DealRow {
    pub hash: String,
    pub merchant: String,
    pub face_value: Decimal,
    pub price: Decimal,
    pub discount_percent: Decimal,
    /// `gcx` or `cardcash`.
    pub source: String,
    pub url: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub appearances: i32,
}

/// Whether a lookup was the first sighting of a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// First time this hash was recorded; the caller should post it.
    New,
    /// Already recorded; the caller must not post it again.
    Seen,
}

#[derive(Debug, Clone)]
pub struct DealLookup {
    pub sighting: Sighting,
    /// The record after this sighting was applied.
    pub record: DealRow,
}

impl DealLookup {
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.sighting == Sighting::New
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Records a sighting of `deal` and reports whether it was new.
///
/// A single `INSERT ... ON CONFLICT (hash) DO UPDATE` either creates the row
/// (`appearances = 1`, `first_seen = last_seen = NOW()`) or bumps
/// `appearances` and `last_seen` on the existing one. Postgres serializes
/// conflicting upserts on the same hash, so exactly one concurrent caller
/// observes `appearances = 1`; that caller gets [`Sighting::New`].
///
/// `last_seen` never moves backwards, even when a transaction that started
/// earlier commits later.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn lookup_or_record(pool: &PgPool, deal: &Deal) -> Result<DealLookup, DbError> {
    let record = sqlx::query_as::<_, DealRow>(&format!(
        "INSERT INTO deals \
             (hash, merchant, face_value, price, discount_percent, source, url) \
         VALUES ($1, $2, $3::numeric(10,2), $4::numeric(10,2), $5::numeric(5,2), $6, $7) \
         ON CONFLICT (hash) DO UPDATE SET \
             last_seen   = GREATEST(deals.last_seen, NOW()), \
             appearances = deals.appearances + 1 \
         RETURNING {DEAL_COLUMNS}"
    ))
    .bind(&deal.identity_hash)
    .bind(&deal.merchant)
    .bind(deal.face_value)
    .bind(deal.price)
    .bind(deal.discount_percent)
    .bind(deal.source.as_str())
    .bind(&deal.url)
    .fetch_one(pool)
    .await?;

    let sighting = if record.appearances == 1 {
        Sighting::New
    } else {
        Sighting::Seen
    };

    tracing::debug!(
        hash = %record.hash,
        merchant = %record.merchant,
        appearances = record.appearances,
        new = sighting == Sighting::New,
        "recorded deal sighting"
    );

    Ok(DealLookup { sighting, record })
}

/// Fetches a single dedup record by hash.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_deal_by_hash(pool: &PgPool, hash: &str) -> Result<Option<DealRow>, DbError> {
    let row = sqlx::query_as::<_, DealRow>(&format!(
        "SELECT {DEAL_COLUMNS} FROM deals WHERE hash = $1"
    ))
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns deals last seen at or after `since` with a discount of at least
/// `min_discount`, most recently seen first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_deals(
    pool: &PgPool,
    since: DateTime<Utc>,
    min_discount: Decimal,
    limit: i64,
) -> Result<Vec<DealRow>, DbError> {
    let rows = sqlx::query_as::<_, DealRow>(&format!(
        "SELECT {DEAL_COLUMNS} FROM deals \
         WHERE last_seen >= $1 AND discount_percent >= $2 \
         ORDER BY last_seen DESC, hash \
         LIMIT $3"
    ))
    .bind(since)
    .bind(min_discount)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Retention maintenance: deletes deals not seen since `cutoff`.
///
/// Deals still referenced by a snapshot are kept so monitoring history stays
/// intact; delete the owning session first to release them.
///
/// Returns the number of deleted rows.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_deals_last_seen_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbError> {
    let deleted = sqlx::query(
        "DELETE FROM deals d \
         WHERE d.last_seen < $1 \
           AND NOT EXISTS (SELECT 1 FROM snapshot_deals sd WHERE sd.deal_hash = d.hash)",
    )
    .bind(cutoff)
    .execute(pool)
    .await?
    .rows_affected();

    tracing::info!(deleted, %cutoff, "purged stale deals");
    Ok(deleted)
}
