mod deals;
mod ingest;
mod monitor;
mod runs;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dealwatch_core::IngestSummary;
use tracing_subscriber::EnvFilter;

use crate::deals::DealsCommands;
use crate::monitor::MonitorCommands;
use crate::runs::RunsCommands;

#[derive(Debug, Parser)]
#[command(name = "dealwatch")]
#[command(about = "Gift-card deal dedup and turnover monitoring")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Deduplicate scraped deals and notify about new ones
    Ingest {
        /// Scraper output file (JSON array of listings); repeatable
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,
        /// Label recorded on each ingest run instead of the bare file name
        #[arg(long)]
        label: Option<String>,
        /// Normalize and print deals without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Turnover monitoring sessions
    Monitor {
        #[command(subcommand)]
        command: MonitorCommands,
    },
    /// Query and maintain the dedup store
    Deals {
        #[command(subcommand)]
        command: DealsCommands,
    },
    /// Ingest run history
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("dealwatch: no command given; run `dealwatch --help` for usage");
        return Ok(());
    };

    let config = dealwatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Commands::Ingest {
        files,
        label,
        dry_run: true,
    } = &command
    {
        return ingest::run_dry_run(&config, files, label.as_deref()).await;
    }

    let pool_config = dealwatch_db::PoolConfig::from_app_config(&config);
    let pool = dealwatch_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                dealwatch_db::ping(&pool).await?;
                println!("database connection ok");
            }
            DbCommands::Migrate => {
                let applied = dealwatch_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
        },
        Commands::Ingest { files, label, .. } => {
            ingest::run_ingest(&pool, &config, &files, label.as_deref()).await?;
        }
        Commands::Monitor { command } => monitor::run_monitor(&pool, &config, command).await?,
        Commands::Deals { command } => deals::run_deals(&pool, &config, command).await?,
        Commands::Runs { command } => runs::run_runs(&pool, command).await?,
    }

    Ok(())
}

/// Marks an ingest run failed, logging rather than propagating a second
/// failure so the original error reaches the caller.
pub(crate) async fn fail_run_best_effort(
    pool: &sqlx::PgPool,
    run_id: i64,
    summary: &IngestSummary,
    message: &str,
) {
    if let Err(mark_err) = dealwatch_db::fail_ingest_run(pool, run_id, message, summary).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark ingest run as failed"
        );
    }
}
