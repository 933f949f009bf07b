//! Database operations for `monitoring_sessions`.
//!
//! Lifecycle: `created` → `recording` → `closed`. Snapshots may only be
//! added while a session is `recording` and its duration has not elapsed.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const SESSION_COLUMNS: &str = "id, public_id, status, duration_minutes, check_interval_minutes, \
                               created_at, started_at, closed_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `monitoring_sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MonitoringSessionRow {
    pub id: i64,
    pub public_id: Uuid,
    /// `created`, `recording`, or `closed`.
    pub status: String,
    pub duration_minutes: i32,
    pub check_interval_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl MonitoringSessionRow {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status == "closed"
    }

    /// When the session's duration runs out, if it has been started.
    #[must_use]
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
            .map(|start| start + Duration::minutes(i64::from(self.duration_minutes)))
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Creates a new monitoring session in `created` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including the CHECK
/// constraints on non-positive durations).
pub async fn create_session(
    pool: &PgPool,
    duration_minutes: i32,
    check_interval_minutes: i32,
) -> Result<MonitoringSessionRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, MonitoringSessionRow>(&format!(
        "INSERT INTO monitoring_sessions \
             (public_id, status, duration_minutes, check_interval_minutes) \
         VALUES ($1, 'created', $2, $3) \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(public_id)
    .bind(duration_minutes)
    .bind(check_interval_minutes)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        session = %row.public_id,
        duration_minutes,
        check_interval_minutes,
        "created monitoring session"
    );
    Ok(row)
}

/// Moves a session from `created` to `recording` and sets `started_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidSessionTransition`] if the session is not in
/// `created` status, or [`DbError::Sqlx`] if the update fails.
pub async fn start_session(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE monitoring_sessions \
         SET status = 'recording', started_at = NOW() \
         WHERE id = $1 AND status = 'created'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidSessionTransition {
            id,
            expected_status: "created",
        });
    }

    Ok(())
}

/// Closes a `created` or `recording` session.
///
/// # Errors
///
/// Returns [`DbError::InvalidSessionTransition`] if the session is unknown
/// or already closed, or [`DbError::Sqlx`] if the update fails.
pub async fn close_session(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE monitoring_sessions \
         SET status = 'closed', closed_at = NOW() \
         WHERE id = $1 AND status IN ('created', 'recording')",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidSessionTransition {
            id,
            expected_status: "created or recording",
        });
    }

    Ok(())
}

/// Closes every `recording` session whose duration has elapsed.
///
/// Returns the number of sessions closed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn close_expired_sessions(pool: &PgPool) -> Result<u64, DbError> {
    let closed = sqlx::query(
        "UPDATE monitoring_sessions \
         SET status = 'closed', closed_at = NOW() \
         WHERE status = 'recording' \
           AND started_at + make_interval(mins => duration_minutes) <= NOW()",
    )
    .execute(pool)
    .await?
    .rows_affected();

    if closed > 0 {
        tracing::info!(closed, "closed expired monitoring sessions");
    }
    Ok(closed)
}

/// Fetches a session by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_session(pool: &PgPool, id: i64) -> Result<MonitoringSessionRow, DbError> {
    sqlx::query_as::<_, MonitoringSessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM monitoring_sessions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetches a session by its public UUID.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no session has that `public_id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_session_by_public_id(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<MonitoringSessionRow, DbError> {
    sqlx::query_as::<_, MonitoringSessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM monitoring_sessions WHERE public_id = $1"
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` sessions, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sessions(pool: &PgPool, limit: i64) -> Result<Vec<MonitoringSessionRow>, DbError> {
    let rows = sqlx::query_as::<_, MonitoringSessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM monitoring_sessions \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Deletes a session together with its snapshots and memberships.
///
/// Dedup records are left untouched.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the session does not exist, or
/// [`DbError::Sqlx`] if the delete fails.
pub async fn delete_session(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM monitoring_sessions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
