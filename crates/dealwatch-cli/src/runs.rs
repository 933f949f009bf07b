//! `runs` commands: ingest run history.

use clap::Subcommand;

/// Sub-commands available under `runs`.
#[derive(Debug, Subcommand)]
pub enum RunsCommands {
    /// List recent ingest runs
    List {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

pub(crate) async fn run_runs(pool: &sqlx::PgPool, command: RunsCommands) -> anyhow::Result<()> {
    match command {
        RunsCommands::List { limit } => {
            let runs = dealwatch_db::list_ingest_runs(pool, limit).await?;
            if runs.is_empty() {
                println!("no ingest runs recorded");
                return Ok(());
            }

            println!(
                "{:<18}{:<32}{:<11}{:>7}{:>6}{:>6}{:>9}  ERROR",
                "CREATED", "BATCH", "STATUS", "FOUND", "NEW", "SEEN", "INVALID"
            );
            for run in &runs {
                println!(
                    "{:<18}{:<32}{:<11}{:>7}{:>6}{:>6}{:>9}  {}",
                    run.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    run.source_label,
                    run.status,
                    run.deals_found,
                    run.deals_new,
                    run.deals_seen,
                    run.deals_invalid,
                    run.error_message.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
    }
}
