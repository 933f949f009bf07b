use std::str::FromStr;

use rust_decimal::Decimal;

use crate::app_config::AppConfig;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_minutes = |var: &str, default: &str| -> Result<i32, ConfigError> {
        let value = or_default(var, default)
            .parse::<i32>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value <= 0 {
            return Err(invalid(var, format!("must be positive, got {value}")));
        }
        Ok(value)
    };

    let parse_percent = |var: &str, default: &str| -> Result<Decimal, ConfigError> {
        let value = Decimal::from_str(or_default(var, default).trim())
            .map_err(|e| invalid(var, e.to_string()))?;
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(invalid(var, format!("must be between 0 and 100, got {value}")));
        }
        Ok(value)
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let database_url = require("DATABASE_URL")?;
    let log_level = or_default("DEALWATCH_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("DEALWATCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("DEALWATCH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("DEALWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let min_discount_percent = parse_percent("DEALWATCH_MIN_DISCOUNT_PERCENT", "15")?;
    let premium_discount_percent = parse_percent("DEALWATCH_PREMIUM_DISCOUNT_PERCENT", "25")?;
    if premium_discount_percent < min_discount_percent {
        return Err(invalid(
            "DEALWATCH_PREMIUM_DISCOUNT_PERCENT",
            format!(
                "premium threshold {premium_discount_percent} is below minimum threshold {min_discount_percent}"
            ),
        ));
    }

    let retention_days = parse_u32("DEALWATCH_RETENTION_DAYS", "30")?;

    let notify_webhook_url = optional("DEALWATCH_NOTIFY_WEBHOOK_URL");
    let premium_webhook_url = optional("DEALWATCH_PREMIUM_WEBHOOK_URL");
    let notify_timeout_secs = parse_u64("DEALWATCH_NOTIFY_TIMEOUT_SECS", "10")?;
    let notify_max_retries = parse_u32("DEALWATCH_NOTIFY_MAX_RETRIES", "3")?;
    let notify_backoff_base_ms = parse_u64("DEALWATCH_NOTIFY_BACKOFF_BASE_MS", "1000")?;

    let max_concurrent_sources = parse_usize("DEALWATCH_MAX_CONCURRENT_SOURCES", "2")?;
    let monitor_duration_minutes = parse_minutes("DEALWATCH_MONITOR_DURATION_MINUTES", "60")?;
    let monitor_interval_minutes = parse_minutes("DEALWATCH_MONITOR_INTERVAL_MINUTES", "10")?;

    Ok(AppConfig {
        database_url,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        min_discount_percent,
        premium_discount_percent,
        retention_days,
        notify_webhook_url,
        premium_webhook_url,
        notify_timeout_secs,
        notify_max_retries,
        notify_backoff_base_ms,
        max_concurrent_sources,
        monitor_duration_minutes,
        monitor_interval_minutes,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
