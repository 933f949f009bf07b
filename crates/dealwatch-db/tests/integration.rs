//! Offline unit tests for dealwatch-db pool configuration and row types.
//! These tests do not require a live database connection.

use dealwatch_core::AppConfig;
use dealwatch_db::{DbError, IngestRunRow, MonitoringSessionRow, PoolConfig};
use rust_decimal::Decimal;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        min_discount_percent: Decimal::from(15),
        premium_discount_percent: Decimal::from(25),
        retention_days: 30,
        notify_webhook_url: None,
        premium_webhook_url: None,
        notify_timeout_secs: 10,
        notify_max_retries: 3,
        notify_backoff_base_ms: 500,
        max_concurrent_sources: 2,
        monitor_duration_minutes: 120,
        monitor_interval_minutes: 10,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn ingest_run_row_summary_maps_counters() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = IngestRunRow {
        id: 1,
        public_id: Uuid::new_v4(),
        source_label: "gcx.json".to_string(),
        trigger_source: "cli".to_string(),
        status: "succeeded".to_string(),
        started_at: Some(Utc::now()),
        completed_at: Some(Utc::now()),
        deals_found: 10,
        deals_invalid: 1,
        deals_filtered: 3,
        deals_new: 4,
        deals_seen: 2,
        deals_posted: 4,
        premium_posted: 1,
        notify_failures: 0,
        error_message: None,
        created_at: Utc::now(),
    };

    let summary = row.summary();
    assert_eq!(summary.found, 10);
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.filtered, 3);
    assert_eq!(summary.new, 4);
    assert_eq!(summary.seen, 2);
    assert_eq!(summary.premium_posted, 1);
    assert_eq!(summary.unprocessed(), 0);
}

#[test]
fn session_row_ends_after_duration() {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    let started = Utc::now();
    let mut row = MonitoringSessionRow {
        id: 3,
        public_id: Uuid::new_v4(),
        status: "created".to_string(),
        duration_minutes: 90,
        check_interval_minutes: 10,
        created_at: started,
        started_at: None,
        closed_at: None,
    };
    assert!(row.ends_at().is_none());
    assert!(!row.is_closed());

    row.status = "recording".to_string();
    row.started_at = Some(started);
    assert_eq!(row.ends_at(), Some(started + Duration::minutes(90)));

    row.status = "closed".to_string();
    assert!(row.is_closed());
}

#[test]
fn session_errors_render_ids() {
    let err = DbError::SessionNotRecording { id: 12 };
    assert_eq!(
        err.to_string(),
        "session 12 is not recording (closed or duration elapsed)"
    );
    assert!(!err.is_referential());

    let err = DbError::InvalidSessionTransition {
        id: 4,
        expected_status: "created",
    };
    assert_eq!(
        err.to_string(),
        "session 4 cannot transition: expected status created"
    );
}
