//! `deals` commands: read-only queries over the dedup store plus retention.

use chrono::{DateTime, TimeDelta, Utc};
use clap::Subcommand;
use dealwatch_core::AppConfig;
use rust_decimal::Decimal;

/// Sub-commands available under `deals`.
#[derive(Debug, Subcommand)]
pub enum DealsCommands {
    /// Show deals seen recently
    Recent {
        /// Look-back window in hours
        #[arg(long, default_value = "24")]
        hours: i64,
        /// Minimum discount percent (default from config)
        #[arg(long)]
        min_discount: Option<Decimal>,
        #[arg(long, default_value = "50")]
        limit: i64,
    },
    /// Delete deals not seen within the retention window
    Cleanup {
        /// Retention window in days (default from config)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Show per-merchant statistics
    Merchants {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

pub(crate) async fn run_deals(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: DealsCommands,
) -> anyhow::Result<()> {
    match command {
        DealsCommands::Recent {
            hours,
            min_discount,
            limit,
        } => {
            run_recent(
                pool,
                hours,
                min_discount.unwrap_or(config.min_discount_percent),
                limit,
            )
            .await
        }
        DealsCommands::Cleanup { days } => {
            run_cleanup(pool, days.unwrap_or(config.retention_days)).await
        }
        DealsCommands::Merchants { limit } => run_merchants(pool, limit).await,
    }
}

/// `now - window`, or an error when the window is not representable.
fn cutoff_before(
    now: DateTime<Utc>,
    window: Option<TimeDelta>,
    flag: &str,
) -> anyhow::Result<DateTime<Utc>> {
    window
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| anyhow::anyhow!("{flag} is too large"))
}

async fn run_recent(
    pool: &sqlx::PgPool,
    hours: i64,
    min_discount: Decimal,
    limit: i64,
) -> anyhow::Result<()> {
    let since = cutoff_before(Utc::now(), TimeDelta::try_hours(hours.max(0)), "--hours")?;
    let deals = dealwatch_db::list_recent_deals(pool, since, min_discount, limit).await?;

    if deals.is_empty() {
        println!("no deals at or above {min_discount}% seen in the last {hours}h");
        return Ok(());
    }

    println!(
        "{:<28}{:<10}{:>9}{:>9}{:>9}{:>6}  LAST SEEN",
        "MERCHANT", "SOURCE", "FACE", "PRICE", "DISC%", "SEEN"
    );
    for deal in &deals {
        let merchant = if deal.merchant.chars().count() > 26 {
            format!("{}...", deal.merchant.chars().take(23).collect::<String>())
        } else {
            deal.merchant.clone()
        };
        println!(
            "{:<28}{:<10}{:>9}{:>9}{:>9}{:>6}  {}",
            merchant,
            deal.source,
            deal.face_value,
            deal.price,
            deal.discount_percent,
            deal.appearances,
            deal.last_seen.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn run_cleanup(pool: &sqlx::PgPool, days: u32) -> anyhow::Result<()> {
    let cutoff = cutoff_before(Utc::now(), TimeDelta::try_days(i64::from(days)), "--days")?;
    let deleted = dealwatch_db::purge_deals_last_seen_before(pool, cutoff).await?;
    println!("deleted {deleted} deal(s) not seen in {days} day(s)");
    Ok(())
}

async fn run_merchants(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let stats = dealwatch_db::list_merchant_stats(pool, limit).await?;
    if stats.is_empty() {
        println!("no merchant statistics yet; run `ingest` first");
        return Ok(());
    }

    println!(
        "{:<28}{:>7}{:>10}  LAST SEEN",
        "MERCHANT", "DEALS", "AVG DISC%"
    );
    for row in &stats {
        println!(
            "{:<28}{:>7}{:>10}  {}",
            row.merchant,
            row.total_deals,
            row.avg_discount,
            row.last_seen.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
