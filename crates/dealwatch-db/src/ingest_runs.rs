//! Database operations for `ingest_runs`.

use chrono::{DateTime, Utc};
use dealwatch_core::IngestSummary;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const RUN_COLUMNS: &str = "id, public_id, source_label, trigger_source, status, started_at, \
                           completed_at, deals_found, deals_invalid, deals_filtered, deals_new, \
                           deals_seen, deals_posted, premium_posted, notify_failures, \
                           error_message, created_at";

/// A row from the `ingest_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestRunRow {
    pub id: i64,
    pub public_id: Uuid,
    /// File name or label of the scraper output this run consumed.
    pub source_label: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deals_found: i32,
    pub deals_invalid: i32,
    pub deals_filtered: i32,
    pub deals_new: i32,
    pub deals_seen: i32,
    pub deals_posted: i32,
    pub premium_posted: i32,
    pub notify_failures: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IngestRunRow {
    /// The counters stored on this run.
    #[must_use]
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            found: self.deals_found,
            invalid: self.deals_invalid,
            filtered: self.deals_filtered,
            new: self.deals_new,
            seen: self.deals_seen,
            posted: self.deals_posted,
            premium_posted: self.premium_posted,
            notify_failures: self.notify_failures,
        }
    }
}

/// Creates a new ingest run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_ingest_run(
    pool: &PgPool,
    source_label: &str,
    trigger_source: &str,
) -> Result<IngestRunRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, IngestRunRow>(&format!(
        "INSERT INTO ingest_runs (public_id, source_label, trigger_source, status) \
         VALUES ($1, $2, $3, 'queued') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(public_id)
    .bind(source_label)
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidIngestRunTransition`] if the run is not
/// `queued`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_ingest_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ingest_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidIngestRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` and stores its counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidIngestRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_ingest_run(
    pool: &PgPool,
    id: i64,
    summary: &IngestSummary,
) -> Result<(), DbError> {
    finish_ingest_run(pool, id, "succeeded", None, summary).await
}

/// Marks a run as `failed`, storing the error and whatever counters were
/// reached before the failure.
///
/// # Errors
///
/// Returns [`DbError::InvalidIngestRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_ingest_run(
    pool: &PgPool,
    id: i64,
    error_message: &str,
    summary: &IngestSummary,
) -> Result<(), DbError> {
    finish_ingest_run(pool, id, "failed", Some(error_message), summary).await
}

async fn finish_ingest_run(
    pool: &PgPool,
    id: i64,
    status: &str,
    error_message: Option<&str>,
    summary: &IngestSummary,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ingest_runs SET \
             status          = $1, \
             completed_at    = NOW(), \
             error_message   = $2, \
             deals_found     = $3, \
             deals_invalid   = $4, \
             deals_filtered  = $5, \
             deals_new       = $6, \
             deals_seen      = $7, \
             deals_posted    = $8, \
             premium_posted  = $9, \
             notify_failures = $10 \
         WHERE id = $11 AND status = 'running'",
    )
    .bind(status)
    .bind(error_message)
    .bind(summary.found)
    .bind(summary.invalid)
    .bind(summary.filtered)
    .bind(summary.new)
    .bind(summary.seen)
    .bind(summary.posted)
    .bind(summary.premium_posted)
    .bind(summary.notify_failures)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidIngestRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_ingest_run(pool: &PgPool, id: i64) -> Result<IngestRunRow, DbError> {
    sqlx::query_as::<_, IngestRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM ingest_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ingest_runs(pool: &PgPool, limit: i64) -> Result<Vec<IngestRunRow>, DbError> {
    let rows = sqlx::query_as::<_, IngestRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM ingest_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
