//! Database operations for `snapshots` and `snapshot_deals`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use dealwatch_core::{SnapshotObservation, Source};
use sqlx::PgPool;

use crate::sessions::get_session;
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `snapshots` table, plus the number of member deals.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub session_id: i64,
    pub check_number: i32,
    pub taken_at: DateTime<Utc>,
    pub deal_count: i64,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Records the live deal set for the next check of a session.
///
/// The next `check_number` (current maximum + 1) is allocated inside the
/// insert. Every hash must already exist in `deals`; unknown hashes are
/// reported before anything is written. Repeated calls are not
/// deduplicated: each call creates a new check.
///
/// # Errors
///
/// - [`DbError::UnknownDealHashes`] if any hash was never recorded.
/// - [`DbError::SessionNotRecording`] if the session is not `recording` or
///   its duration has elapsed.
/// - [`DbError::NotFound`] if the session does not exist.
/// - [`DbError::Sqlx`] if a statement fails, including a unique violation
///   when two recorders race for the same check number.
pub async fn record_snapshot(
    pool: &PgPool,
    session_id: i64,
    hashes: &BTreeSet<String>,
) -> Result<SnapshotRow, DbError> {
    ensure_known_hashes(pool, hashes).await?;

    let inserted = sqlx::query_as::<_, (i64, i32, DateTime<Utc>)>(
        "INSERT INTO snapshots (session_id, check_number) \
         SELECT s.id, \
                COALESCE((SELECT MAX(check_number) FROM snapshots WHERE session_id = s.id), 0) + 1 \
         FROM monitoring_sessions s \
         WHERE s.id = $1 \
           AND s.status = 'recording' \
           AND s.started_at + make_interval(mins => s.duration_minutes) > NOW() \
         RETURNING id, check_number, taken_at",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    let Some((snapshot_id, check_number, taken_at)) = inserted else {
        return Err(not_recording(pool, session_id).await);
    };

    let deal_count = insert_members(pool, snapshot_id, hashes).await?;

    tracing::info!(
        session_id,
        check_number,
        deals = deal_count,
        "recorded snapshot"
    );

    Ok(SnapshotRow {
        id: snapshot_id,
        session_id,
        check_number,
        taken_at,
        deal_count,
    })
}

/// Records (or resumes) the snapshot for an explicit `check_number`.
///
/// Used to retry after a partial write: an existing snapshot row for
/// `(session_id, check_number)` is reused and only missing memberships are
/// added. Allowed while the session is `recording`, even past its duration,
/// so an interrupted final check can still be completed.
///
/// # Errors
///
/// Same as [`record_snapshot`].
pub async fn record_snapshot_at(
    pool: &PgPool,
    session_id: i64,
    check_number: i32,
    hashes: &BTreeSet<String>,
) -> Result<SnapshotRow, DbError> {
    ensure_known_hashes(pool, hashes).await?;

    let upserted = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
        "INSERT INTO snapshots (session_id, check_number) \
         SELECT s.id, $2 \
         FROM monitoring_sessions s \
         WHERE s.id = $1 AND s.status = 'recording' \
         ON CONFLICT (session_id, check_number) DO UPDATE SET taken_at = snapshots.taken_at \
         RETURNING id, taken_at",
    )
    .bind(session_id)
    .bind(check_number)
    .fetch_optional(pool)
    .await?;

    let Some((snapshot_id, taken_at)) = upserted else {
        return Err(not_recording(pool, session_id).await);
    };

    insert_members(pool, snapshot_id, hashes).await?;
    let deal_count = count_members(pool, snapshot_id).await?;

    tracing::info!(
        session_id,
        check_number,
        deals = deal_count,
        "recorded snapshot at explicit check number"
    );

    Ok(SnapshotRow {
        id: snapshot_id,
        session_id,
        check_number,
        taken_at,
        deal_count,
    })
}

/// Returns a session's snapshots ordered by `check_number`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_session_snapshots(
    pool: &PgPool,
    session_id: i64,
) -> Result<Vec<SnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        "SELECT s.id, s.session_id, s.check_number, s.taken_at, \
                COUNT(sd.deal_hash) AS deal_count \
         FROM snapshots s \
         LEFT JOIN snapshot_deals sd ON sd.snapshot_id = s.id \
         WHERE s.session_id = $1 \
         GROUP BY s.id \
         ORDER BY s.check_number",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Loads every snapshot of a session with its member hashes and their
/// sources, ordered by `check_number`. Snapshots with no members are
/// included with an empty deal map.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_session_observations(
    pool: &PgPool,
    session_id: i64,
) -> Result<Vec<SnapshotObservation>, DbError> {
    let rows = sqlx::query_as::<_, (i32, DateTime<Utc>, Option<String>, Option<String>)>(
        "SELECT s.check_number, s.taken_at, sd.deal_hash, d.source \
         FROM snapshots s \
         LEFT JOIN snapshot_deals sd ON sd.snapshot_id = s.id \
         LEFT JOIN deals d ON d.hash = sd.deal_hash \
         WHERE s.session_id = $1 \
         ORDER BY s.check_number, sd.deal_hash",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    let mut observations: Vec<SnapshotObservation> = Vec::new();
    for (check_number, taken_at, hash, source) in rows {
        if observations
            .last()
            .is_none_or(|o| o.check_number != check_number)
        {
            observations.push(SnapshotObservation {
                check_number,
                taken_at,
                deals: BTreeMap::new(),
            });
        }
        let (Some(hash), Some(source)) = (hash, source) else {
            continue;
        };
        match source.parse::<Source>() {
            Ok(source) => {
                if let Some(current) = observations.last_mut() {
                    current.deals.insert(hash, source);
                }
            }
            Err(e) => {
                tracing::warn!(%hash, error = %e, "skipping snapshot member with unknown source");
            }
        }
    }

    Ok(observations)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn ensure_known_hashes(pool: &PgPool, hashes: &BTreeSet<String>) -> Result<(), DbError> {
    let missing = missing_hashes(pool, hashes).await?;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DbError::UnknownDealHashes(missing))
    }
}

async fn missing_hashes(pool: &PgPool, hashes: &BTreeSet<String>) -> Result<Vec<String>, DbError> {
    if hashes.is_empty() {
        return Ok(Vec::new());
    }
    let wanted: Vec<&str> = hashes.iter().map(String::as_str).collect();
    let missing = sqlx::query_scalar::<_, String>(
        "SELECT t.h FROM UNNEST($1::text[]) AS t(h) \
         WHERE NOT EXISTS (SELECT 1 FROM deals d WHERE d.hash = t.h) \
         ORDER BY t.h",
    )
    .bind(&wanted)
    .fetch_all(pool)
    .await?;
    Ok(missing)
}

/// Inserts memberships in one statement; returns the number of new rows.
async fn insert_members(
    pool: &PgPool,
    snapshot_id: i64,
    hashes: &BTreeSet<String>,
) -> Result<i64, DbError> {
    if hashes.is_empty() {
        return Ok(0);
    }
    let members: Vec<&str> = hashes.iter().map(String::as_str).collect();
    let result = sqlx::query(
        "INSERT INTO snapshot_deals (snapshot_id, deal_hash) \
         SELECT $1, UNNEST($2::text[]) \
         ON CONFLICT (snapshot_id, deal_hash) DO NOTHING",
    )
    .bind(snapshot_id)
    .bind(&members)
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(i64::try_from(done.rows_affected()).unwrap_or(i64::MAX)),
        // A deal purged between the existence check and this insert.
        Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
            let missing = missing_hashes(pool, hashes).await?;
            Err(DbError::UnknownDealHashes(missing))
        }
        Err(e) => Err(e.into()),
    }
}

async fn count_members(pool: &PgPool, snapshot_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM snapshot_deals WHERE snapshot_id = $1",
    )
    .bind(snapshot_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Explains why a snapshot insert matched no session row.
async fn not_recording(pool: &PgPool, session_id: i64) -> DbError {
    match get_session(pool, session_id).await {
        Ok(_) => DbError::SessionNotRecording { id: session_id },
        Err(e) => e,
    }
}
