//! `monitor` commands: record live-listing snapshots and analyze turnover.

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Subcommand;
use dealwatch_core::{AppConfig, DiscountThresholds, IngestSummary, TurnoverReport};
use dealwatch_db::{MonitoringSessionRow, SnapshotRow};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ingest::{announce_new_deal, prepare_deals, read_records, Notifiers};

/// Sub-commands available under `monitor`.
#[derive(Debug, Subcommand)]
pub enum MonitorCommands {
    /// Create a session and start recording
    Start {
        /// How long the session accepts snapshots (default from config)
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..))]
        duration_minutes: Option<i32>,
        /// Expected minutes between checks (default from config)
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..))]
        interval_minutes: Option<i32>,
    },
    /// Record one snapshot of the live listings in the given files
    Check {
        #[arg(long)]
        session: Uuid,
        /// Scraper output file; repeatable
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,
        /// Resume a partially written check instead of starting the next one
        #[arg(long, value_parser = clap::value_parser!(i32).range(1..))]
        check_number: Option<i32>,
    },
    /// Stop a session from accepting snapshots
    Close {
        #[arg(long)]
        session: Uuid,
    },
    /// Close every recording session whose duration has elapsed
    Sweep,
    /// Print the turnover report for a session
    Analyze {
        #[arg(long)]
        session: Uuid,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List recent sessions
    List {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Delete a session and its snapshots
    Delete {
        #[arg(long)]
        session: Uuid,
    },
}

pub(crate) async fn run_monitor(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: MonitorCommands,
) -> anyhow::Result<()> {
    match command {
        MonitorCommands::Start {
            duration_minutes,
            interval_minutes,
        } => {
            run_start(
                pool,
                duration_minutes.unwrap_or(config.monitor_duration_minutes),
                interval_minutes.unwrap_or(config.monitor_interval_minutes),
            )
            .await
        }
        MonitorCommands::Check {
            session,
            files,
            check_number,
        } => run_check(pool, config, session, &files, check_number).await,
        MonitorCommands::Close { session } => {
            let row = find_session(pool, session).await?;
            dealwatch_db::close_session(pool, row.id).await?;
            println!("closed session {session}");
            Ok(())
        }
        MonitorCommands::Sweep => {
            let closed = dealwatch_db::close_expired_sessions(pool).await?;
            println!("closed {closed} expired session(s)");
            Ok(())
        }
        MonitorCommands::Analyze { session, json } => run_analyze(pool, session, json).await,
        MonitorCommands::List { limit } => run_list(pool, limit).await,
        MonitorCommands::Delete { session } => {
            let row = find_session(pool, session).await?;
            dealwatch_db::delete_session(pool, row.id).await?;
            println!("deleted session {session}");
            Ok(())
        }
    }
}

async fn find_session(pool: &sqlx::PgPool, public_id: Uuid) -> anyhow::Result<MonitoringSessionRow> {
    match dealwatch_db::get_session_by_public_id(pool, public_id).await {
        Ok(row) => Ok(row),
        Err(dealwatch_db::DbError::NotFound) => {
            anyhow::bail!("session {public_id} not found; see `monitor list`")
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_start(
    pool: &sqlx::PgPool,
    duration_minutes: i32,
    interval_minutes: i32,
) -> anyhow::Result<()> {
    let session = dealwatch_db::create_session(pool, duration_minutes, interval_minutes).await?;
    dealwatch_db::start_session(pool, session.id).await?;

    println!("{}", session.public_id);
    eprintln!(
        "recording for {duration_minutes} min; run `monitor check --session {}` every {interval_minutes} min",
        session.public_id
    );
    Ok(())
}

/// Thresholds for snapshots: every valid listing counts as live, premium
/// tagging still follows config.
fn snapshot_thresholds(premium_discount_percent: Decimal) -> DiscountThresholds {
    DiscountThresholds {
        premium_discount_percent,
        ..DiscountThresholds::monitoring()
    }
}

async fn run_check(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    public_id: Uuid,
    files: &[PathBuf],
    check_number: Option<i32>,
) -> anyhow::Result<()> {
    let session = find_session(pool, public_id).await?;
    let notifiers = Notifiers::from_config(config)?;
    let (snapshot, summary) =
        record_check(pool, config, &notifiers, session.id, files, check_number).await?;

    println!(
        "check #{} recorded: {} live deal(s), {} first seen, {} posted, {} invalid",
        snapshot.check_number,
        snapshot.deal_count,
        summary.new,
        summary.posted + summary.premium_posted,
        summary.invalid
    );
    Ok(())
}

/// Records one check of a session from scraper output files.
///
/// Every valid listing joins the snapshot, but a listing first seen here
/// that meets the posting thresholds is announced exactly as `ingest`
/// would, since a later ingest will only see it as SEEN.
pub(crate) async fn record_check(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    notifiers: &Notifiers,
    session_id: i64,
    files: &[PathBuf],
    check_number: Option<i32>,
) -> anyhow::Result<(SnapshotRow, IngestSummary)> {
    let thresholds = snapshot_thresholds(config.premium_discount_percent);

    // A snapshot is only meaningful if it covers every source, so any
    // unreadable file aborts the check.
    let mut summary = IngestSummary::default();
    let mut deals = Vec::new();
    for path in files {
        let records = read_records(path).await?;
        deals.extend(prepare_deals(records, &thresholds, &mut summary));
    }

    let mut hashes = BTreeSet::new();
    for deal in &deals {
        let lookup = dealwatch_db::lookup_or_record(pool, deal).await?;
        if lookup.is_new() {
            summary.new = summary.new.saturating_add(1);
            if deal.discount_percent >= config.min_discount_percent {
                announce_new_deal(pool, notifiers, deal, &mut summary).await?;
            }
        } else {
            summary.seen = summary.seen.saturating_add(1);
        }
        hashes.insert(lookup.record.hash);
    }

    let snapshot = match check_number {
        Some(n) => dealwatch_db::record_snapshot_at(pool, session_id, n, &hashes).await?,
        None => dealwatch_db::record_snapshot(pool, session_id, &hashes).await?,
    };
    Ok((snapshot, summary))
}

async fn run_analyze(pool: &sqlx::PgPool, public_id: Uuid, json: bool) -> anyhow::Result<()> {
    let session = find_session(pool, public_id).await?;
    let analysis = dealwatch_db::analyze_session(pool, session.id).await?;

    if json {
        let body = serde_json::json!({
            "session": analysis.session.public_id,
            "status": analysis.session.status,
            "provisional": analysis.provisional,
            "report": analysis.report,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!(
        "session {} ({}, every {} min){}",
        analysis.session.public_id,
        analysis.session.status,
        analysis.session.check_interval_minutes,
        if analysis.provisional {
            " [provisional]"
        } else {
            ""
        }
    );
    print_report(&analysis.report);
    Ok(())
}

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

fn print_report(report: &TurnoverReport) {
    if report.steps.is_empty() {
        println!(
            "{} snapshot(s); at least two are needed to measure turnover",
            report.snapshot_count
        );
        return;
    }

    println!();
    println!(
        "{:<10}{:>6}{:>9}{:>11}{:>10}",
        "CHECKS", "NEW", "REMOVED", "PERSISTED", "TURNOVER"
    );
    for step in &report.steps {
        println!(
            "{:<10}{:>6}{:>9}{:>11}{:>10}",
            format!("{}->{}", step.from_check, step.to_check),
            step.new.len(),
            step.removed.len(),
            step.persisted.len(),
            percent(step.turnover_rate)
        );
    }

    println!();
    println!(
        "{:<10}{:>10}{:>8}{:>13}{:>15}  SUGGESTED INTERVAL",
        "SOURCE", "TURNOVER", "DEALS", "DISAPPEARED", "AVG LIFETIME"
    );
    for source in &report.sources {
        let lifetime = if source.avg_lifetime_minutes > 0.0 {
            format!("{:.0} min", source.avg_lifetime_minutes)
        } else {
            "-".to_string()
        };
        let band = source.recommendation.map_or_else(
            || "-".to_string(),
            |r| format!("{}-{} min", r.min_interval_minutes, r.max_interval_minutes),
        );
        println!(
            "{:<10}{:>10}{:>8}{:>13}{:>15}  {band}",
            source.source.as_str(),
            percent(source.turnover_rate),
            source.total_deals_seen,
            source.disappeared_deals,
            lifetime
        );
    }

    if let Some(overall) = report.overall {
        println!();
        println!(
            "recommended check interval: {} min ({})",
            overall.max_interval_minutes, overall.rationale
        );
    }
}

async fn run_list(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let sessions = dealwatch_db::list_sessions(pool, limit).await?;
    if sessions.is_empty() {
        println!("no monitoring sessions; run `monitor start` first");
        return Ok(());
    }

    println!(
        "{:<38}{:<11}{:>10}{:>10}  STARTED",
        "SESSION", "STATUS", "DURATION", "INTERVAL"
    );
    for s in &sessions {
        let started = s.started_at.map_or_else(
            || "-".to_string(),
            |t| t.format("%Y-%m-%d %H:%M").to_string(),
        );
        println!(
            "{:<38}{:<11}{:>10}{:>10}  {started}",
            s.public_id.to_string(),
            s.status,
            s.duration_minutes,
            s.check_interval_minutes
        );
    }
    Ok(())
}
