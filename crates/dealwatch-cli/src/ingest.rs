//! `ingest` command: dedup scraper output and notify about new deals.
//!
//! Each input file is one batch with its own `ingest_runs` row. Batches run
//! concurrently up to `max_concurrent_sources`; a failing batch is recorded
//! and reported without affecting the others.

use std::path::{Path, PathBuf};

use dealwatch_core::{
    normalize_deal, AppConfig, Deal, DiscountThresholds, IngestSummary, RawDeal, ValidationError,
};
use dealwatch_db::DbError;
use dealwatch_notify::{DealNotification, WebhookNotifier};
use futures::stream::{self, StreamExt};

use crate::fail_run_best_effort;

/// Webhook endpoints new deals are posted to. Either may be unset.
pub(crate) struct Notifiers {
    regular: Option<WebhookNotifier>,
    premium: Option<WebhookNotifier>,
}

impl Notifiers {
    pub(crate) fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let build = |url: Option<&str>| -> anyhow::Result<Option<WebhookNotifier>> {
            url.map(|url| {
                WebhookNotifier::new(
                    url,
                    config.notify_timeout_secs,
                    config.notify_max_retries,
                    config.notify_backoff_base_ms,
                )
                .map_err(|e| anyhow::anyhow!("failed to build webhook notifier: {e}"))
            })
            .transpose()
        };

        Ok(Self {
            regular: build(config.notify_webhook_url.as_deref())?,
            premium: build(config.premium_webhook_url.as_deref())?,
        })
    }

    /// Posts a new deal; delivery failures are counted, never propagated.
    async fn notify(&self, deal: &Deal, summary: &mut IngestSummary) {
        let notification = DealNotification::from(deal);

        if let Some(regular) = &self.regular {
            match regular.post_deal(&notification).await {
                Ok(()) => summary.posted = summary.posted.saturating_add(1),
                Err(e) => {
                    tracing::warn!(hash = %deal.identity_hash, error = %e, "failed to post deal");
                    summary.notify_failures = summary.notify_failures.saturating_add(1);
                }
            }
        }

        if deal.is_premium() {
            if let Some(premium) = &self.premium {
                match premium.post_deal(&notification).await {
                    Ok(()) => summary.premium_posted = summary.premium_posted.saturating_add(1),
                    Err(e) => {
                        tracing::warn!(
                            hash = %deal.identity_hash,
                            error = %e,
                            "failed to post premium deal"
                        );
                        summary.notify_failures = summary.notify_failures.saturating_add(1);
                    }
                }
            }
        }
    }
}

/// Result of one batch, for the final report.
pub(crate) struct BatchOutcome {
    pub label: String,
    pub summary: IngestSummary,
    pub error: Option<String>,
}

/// Name recorded on the `ingest_runs` row for `path`.
pub(crate) fn batch_label(label: Option<&str>, path: &Path) -> String {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    match label {
        Some(label) => format!("{label}:{name}"),
        None => name,
    }
}

/// Reads a scraper output file: a JSON array of listing objects.
pub(crate) async fn read_records(path: &Path) -> anyhow::Result<Vec<serde_json::Value>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("{} is not a JSON array of listings: {e}", path.display()))
}

/// Decodes one element of a scraper file.
pub(crate) fn parse_record(value: serde_json::Value) -> Result<RawDeal, ValidationError> {
    serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))
}

/// Parses and normalizes a batch, counting every rejection in `summary`.
pub(crate) fn prepare_deals(
    records: Vec<serde_json::Value>,
    thresholds: &DiscountThresholds,
    summary: &mut IngestSummary,
) -> Vec<Deal> {
    summary.found = summary
        .found
        .saturating_add(i32::try_from(records.len()).unwrap_or(i32::MAX));

    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            match parse_record(value).and_then(|raw| normalize_deal(&raw, thresholds)) {
                Ok(deal) => Some(deal),
                Err(e) => {
                    if e.is_below_threshold() {
                        tracing::debug!(index, reason = %e, "filtered listing");
                    } else {
                        tracing::warn!(index, reason = %e, "dropping invalid listing");
                    }
                    summary.record_rejection(&e);
                    None
                }
            }
        })
        .collect()
}

/// Records each deal in the dedup store and handles the new ones.
///
/// Stops at the first storage error; `summary` holds the counts reached.
async fn record_deals(
    pool: &sqlx::PgPool,
    notifiers: &Notifiers,
    deals: &[Deal],
    summary: &mut IngestSummary,
) -> Result<(), DbError> {
    for deal in deals {
        let lookup = dealwatch_db::lookup_or_record(pool, deal).await?;
        if !lookup.is_new() {
            summary.seen = summary.seen.saturating_add(1);
            continue;
        }

        summary.new = summary.new.saturating_add(1);
        announce_new_deal(pool, notifiers, deal, summary).await?;
    }
    Ok(())
}

/// Posts a deal the dedup store just reported as new and folds it into the
/// merchant statistics. Whoever observes the NEW sighting must call this,
/// since every later sighting is SEEN.
pub(crate) async fn announce_new_deal(
    pool: &sqlx::PgPool,
    notifiers: &Notifiers,
    deal: &Deal,
    summary: &mut IngestSummary,
) -> Result<(), DbError> {
    tracing::info!(
        hash = %deal.identity_hash,
        merchant = %deal.merchant,
        source = %deal.source,
        discount = %deal.discount_percent,
        premium = deal.is_premium(),
        "new deal"
    );
    notifiers.notify(deal, summary).await;
    dealwatch_db::record_merchant_deal(
        pool,
        &deal.merchant_key(),
        &deal.merchant,
        deal.discount_percent,
    )
    .await
    .map(|_| ())
}

/// Runs one batch end to end and reports how it went.
pub(crate) async fn ingest_file(
    pool: &sqlx::PgPool,
    thresholds: &DiscountThresholds,
    notifiers: &Notifiers,
    path: &Path,
    label: String,
) -> BatchOutcome {
    let mut summary = IngestSummary::default();
    let failed = |summary: IngestSummary, message: String| BatchOutcome {
        label: label.clone(),
        summary,
        error: Some(message),
    };

    let run = match dealwatch_db::create_ingest_run(pool, &label, "cli").await {
        Ok(run) => run,
        Err(e) => return failed(summary, format!("{e:#}")),
    };
    if let Err(e) = dealwatch_db::start_ingest_run(pool, run.id).await {
        let message = format!("{e:#}");
        fail_run_best_effort(pool, run.id, &summary, &message).await;
        return failed(summary, message);
    }

    let records = match read_records(path).await {
        Ok(records) => records,
        Err(e) => {
            let message = format!("{e:#}");
            tracing::error!(batch = %label, error = %message, "failed to load batch");
            fail_run_best_effort(pool, run.id, &summary, &message).await;
            return failed(summary, message);
        }
    };

    let deals = prepare_deals(records, thresholds, &mut summary);

    if let Err(e) = record_deals(pool, notifiers, &deals, &mut summary).await {
        let message = format!("{e:#}");
        tracing::error!(
            batch = %label,
            error = %message,
            unprocessed = summary.unprocessed(),
            "storage error, aborting batch"
        );
        fail_run_best_effort(pool, run.id, &summary, &message).await;
        return failed(summary, message);
    }

    if let Err(e) = dealwatch_db::complete_ingest_run(pool, run.id, &summary).await {
        let message = format!("{e:#}");
        fail_run_best_effort(pool, run.id, &summary, &message).await;
        return failed(summary, message);
    }

    tracing::info!(
        batch = %label,
        found = summary.found,
        new = summary.new,
        seen = summary.seen,
        invalid = summary.invalid,
        filtered = summary.filtered,
        "batch complete"
    );

    BatchOutcome {
        label,
        summary,
        error: None,
    }
}

/// Ingests every file and prints a per-batch report.
///
/// # Errors
///
/// Returns an error if a webhook URL is invalid or if any batch failed; the
/// other batches still run to completion.
pub(crate) async fn run_ingest(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    files: &[PathBuf],
    label: Option<&str>,
) -> anyhow::Result<()> {
    let notifiers = Notifiers::from_config(config)?;
    let thresholds = config.thresholds();
    let max_concurrent = config.max_concurrent_sources.max(1);

    let outcomes: Vec<BatchOutcome> = stream::iter(files)
        .map(|path| {
            let label = batch_label(label, path);
            ingest_file(pool, &thresholds, &notifiers, path, label)
        })
        .buffer_unordered(max_concurrent)
        .collect()
        .await;

    print_outcomes(&outcomes);

    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} batch(es) failed", outcomes.len());
    }
    Ok(())
}

/// Normalizes every file and prints the deals that would be recorded.
///
/// # Errors
///
/// Returns an error if a file cannot be read or is not a JSON array.
pub(crate) async fn run_dry_run(
    config: &AppConfig,
    files: &[PathBuf],
    label: Option<&str>,
) -> anyhow::Result<()> {
    let thresholds = config.thresholds();
    for path in files {
        let records = read_records(path).await?;
        let mut summary = IngestSummary::default();
        let deals = prepare_deals(records, &thresholds, &mut summary);

        println!("dry-run: {}", batch_label(label, path));
        for deal in &deals {
            println!(
                "  {:<28}{:<10}{:>9}{:>9}{:>8}%  {}",
                deal.merchant,
                deal.source.as_str(),
                deal.face_value,
                deal.price,
                deal.discount_percent,
                if deal.is_premium() { "premium" } else { "" }
            );
        }
        println!(
            "  {} found, {} eligible, {} filtered, {} invalid",
            summary.found,
            deals.len(),
            summary.filtered,
            summary.invalid
        );
    }
    Ok(())
}

fn print_outcomes(outcomes: &[BatchOutcome]) {
    println!(
        "{:<32}{:>7}{:>6}{:>6}{:>9}{:>9}{:>8}{:>11}  STATUS",
        "BATCH", "FOUND", "NEW", "SEEN", "INVALID", "FILTERED", "POSTED", "NOTIFY_ERR"
    );
    let mut total = IngestSummary::default();
    for outcome in outcomes {
        let s = &outcome.summary;
        total.absorb(s);
        let status = outcome.error.as_deref().map_or_else(
            || "ok".to_string(),
            |e| format!("failed: {e}"),
        );
        println!(
            "{:<32}{:>7}{:>6}{:>6}{:>9}{:>9}{:>8}{:>11}  {status}",
            outcome.label,
            s.found,
            s.new,
            s.seen,
            s.invalid,
            s.filtered,
            s.posted + s.premium_posted,
            s.notify_failures
        );
    }
    if outcomes.len() > 1 {
        println!(
            "{:<32}{:>7}{:>6}{:>6}{:>9}{:>9}{:>8}{:>11}",
            "TOTAL",
            total.found,
            total.new,
            total.seen,
            total.invalid,
            total.filtered,
            total.posted + total.premium_posted,
            total.notify_failures
        );
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;

    #[test]
    fn batch_label_uses_file_name() {
        let path = Path::new("/var/scrapes/gcx-2026-10-18.json");
        assert_eq!(batch_label(None, path), "gcx-2026-10-18.json");
        assert_eq!(batch_label(Some("morning"), path), "morning:gcx-2026-10-18.json");
    }

    #[test]
    fn parse_record_reports_missing_fields_as_malformed() {
        let err = parse_record(json!({ "merchant": "Target", "source": "gcx" }))
            .expect_err("missing prices should fail");
        assert!(matches!(err, ValidationError::Malformed(_)));
        assert!(!err.is_below_threshold());
    }

    #[test]
    fn parse_record_accepts_string_and_numeric_money() {
        let raw = parse_record(json!({
            "merchant": "Target",
            "face_value": "100.00",
            "price": 80,
            "source": "raise"
        }))
        .expect("valid record");
        assert_eq!(raw.face_value, Decimal::from(100));
        assert_eq!(raw.price, Decimal::from(80));
        assert!(raw.url.is_none());
    }

    #[test]
    fn prepare_deals_counts_every_record_once() {
        let records = vec![
            json!({ "merchant": "Target", "face_value": "100", "price": "80", "source": "gcx" }),
            json!({ "merchant": "Nike", "face_value": "100", "price": "95", "source": "gcx" }),
            json!({ "merchant": "", "face_value": "100", "price": "50", "source": "cardcash" }),
            json!({ "merchant": "Gap", "face_value": "50", "price": "60", "source": "cardcash" }),
            json!("not an object"),
            json!({ "merchant": "Lowes", "face_value": "200", "price": "140", "source": "cardcash" }),
        ];
        let mut summary = IngestSummary::default();

        let deals = prepare_deals(records, &DiscountThresholds::default(), &mut summary);

        assert_eq!(summary.found, 6);
        assert_eq!(deals.len(), 2);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.invalid, 3);
        assert!(deals.iter().any(|d| d.merchant == "Lowes" && d.is_premium()));
        assert!(deals.iter().any(|d| d.merchant == "Target" && !d.is_premium()));
    }

    #[test]
    fn prepare_deals_accepts_empty_batch() {
        let mut summary = IngestSummary::default();
        let deals = prepare_deals(Vec::new(), &DiscountThresholds::default(), &mut summary);
        assert!(deals.is_empty());
        assert_eq!(summary, IngestSummary::default());
    }

    #[tokio::test]
    async fn read_records_rejects_non_array_file() {
        let path = std::env::temp_dir().join(format!("dealwatch-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, r#"{"merchant":"Target"}"#)
            .await
            .expect("write temp file");

        let err = read_records(&path).await.expect_err("object is not an array");
        assert!(err.to_string().contains("not a JSON array"));

        tokio::fs::remove_file(&path).await.ok();
    }
}
