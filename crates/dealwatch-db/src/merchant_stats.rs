//! Running per-merchant statistics over newly recorded deals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `merchant_stats` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MerchantStatsRow {
    pub merchant_key: String,
    /// Display name from the most recent deal.
    pub merchant: String,
    pub total_deals: i32,
    pub avg_discount: Decimal,
    pub last_seen: DateTime<Utc>,
}

/// Folds one new deal into its merchant's running average.
///
/// The average is recomputed inside the upsert from the stored row, so
/// concurrent callers for the same merchant cannot lose updates.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_merchant_deal(
    pool: &PgPool,
    merchant_key: &str,
    merchant: &str,
    discount_percent: Decimal,
) -> Result<MerchantStatsRow, DbError> {
    let row = sqlx::query_as::<_, MerchantStatsRow>(
        "INSERT INTO merchant_stats (merchant_key, merchant, total_deals, avg_discount) \
         VALUES ($1, $2, 1, $3::numeric(5,2)) \
         ON CONFLICT (merchant_key) DO UPDATE SET \
             merchant     = EXCLUDED.merchant, \
             avg_discount = ROUND( \
                 (merchant_stats.avg_discount * merchant_stats.total_deals + EXCLUDED.avg_discount) \
                 / (merchant_stats.total_deals + 1), 2), \
             total_deals  = merchant_stats.total_deals + 1, \
             last_seen    = NOW() \
         RETURNING merchant_key, merchant, total_deals, avg_discount, last_seen",
    )
    .bind(merchant_key)
    .bind(merchant)
    .bind(discount_percent)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Returns merchants ordered by deal count, then average discount.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_merchant_stats(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<MerchantStatsRow>, DbError> {
    let rows = sqlx::query_as::<_, MerchantStatsRow>(
        "SELECT merchant_key, merchant, total_deals, avg_discount, last_seen \
         FROM merchant_stats \
         ORDER BY total_deals DESC, avg_discount DESC, merchant_key \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
