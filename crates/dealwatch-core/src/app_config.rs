use rust_decimal::Decimal;

use crate::deals::DiscountThresholds;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub min_discount_percent: Decimal,
    pub premium_discount_percent: Decimal,
    pub retention_days: u32,
    pub notify_webhook_url: Option<String>,
    pub premium_webhook_url: Option<String>,
    pub notify_timeout_secs: u64,
    pub notify_max_retries: u32,
    pub notify_backoff_base_ms: u64,
    pub max_concurrent_sources: usize,
    pub monitor_duration_minutes: i32,
    pub monitor_interval_minutes: i32,
}

impl AppConfig {
    /// Discount thresholds used when normalizing deals for posting.
    #[must_use]
    pub fn thresholds(&self) -> DiscountThresholds {
        DiscountThresholds {
            min_discount_percent: self.min_discount_percent,
            premium_discount_percent: self.premium_discount_percent,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("min_discount_percent", &self.min_discount_percent)
            .field("premium_discount_percent", &self.premium_discount_percent)
            .field("retention_days", &self.retention_days)
            .field(
                "notify_webhook_url",
                &self.notify_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "premium_webhook_url",
                &self.premium_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .field("notify_timeout_secs", &self.notify_timeout_secs)
            .field("notify_max_retries", &self.notify_max_retries)
            .field("notify_backoff_base_ms", &self.notify_backoff_base_ms)
            .field("max_concurrent_sources", &self.max_concurrent_sources)
            .field("monitor_duration_minutes", &self.monitor_duration_minutes)
            .field("monitor_interval_minutes", &self.monitor_interval_minutes)
            .finish()
    }
}
