use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

// Path relative to crates/dealwatch-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &dealwatch_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("session {id} cannot transition: expected status {expected_status}")]
    InvalidSessionTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error("session {id} is not recording (closed or duration elapsed)")]
    SessionNotRecording { id: i64 },
    #[error("ingest run {id} cannot transition: expected status {expected_status}")]
    InvalidIngestRunTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error("snapshot references {} unknown deal hash(es): {}", .0.len(), .0.join(", "))]
    UnknownDealHashes(Vec<String>),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// `true` for ordering bugs where a snapshot referenced deals that were
    /// never recorded in the dedup store.
    #[must_use]
    pub fn is_referential(&self) -> bool {
        matches!(self, DbError::UnknownDealHashes(_))
    }
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table does not exist on a fresh database; treat
    // absence as zero applied.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    }

    #[test]
    fn unknown_hash_error_lists_hashes() {
        let err = DbError::UnknownDealHashes(vec!["abc".to_string(), "def".to_string()]);
        assert!(err.is_referential());
        assert_eq!(
            err.to_string(),
            "snapshot references 2 unknown deal hash(es): abc, def"
        );
    }
}

pub mod deals;
pub mod ingest_runs;
pub mod merchant_stats;
pub mod sessions;
pub mod snapshots;
pub mod turnover;

pub use deals::{
    get_deal_by_hash, list_recent_deals, lookup_or_record, purge_deals_last_seen_before,
    DealLookup, DealRow, Sighting,
};
pub use ingest_runs::{
    complete_ingest_run, create_ingest_run, fail_ingest_run, get_ingest_run, list_ingest_runs,
    start_ingest_run, IngestRunRow,
};
pub use merchant_stats::{list_merchant_stats, record_merchant_deal, MerchantStatsRow};
pub use sessions::{
    close_expired_sessions, close_session, create_session, delete_session, get_session,
    get_session_by_public_id, list_sessions, start_session, MonitoringSessionRow,
};
pub use snapshots::{
    list_session_snapshots, load_session_observations, record_snapshot, record_snapshot_at,
    SnapshotRow,
};
pub use turnover::{analyze_session, SessionTurnover};
