pub mod app_config;
pub mod config;
pub mod deals;
pub mod ingest;
pub mod turnover;

use thiserror::Error;

pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env};
pub use deals::{
    normalize_deal, Deal, DealTier, DiscountThresholds, RawDeal, Source, ValidationError,
};
pub use ingest::IngestSummary;
pub use turnover::{
    analyze_snapshots, recommend_check_interval, turnover_rate, CheckRecommendation,
    SnapshotObservation, SourceSummary, SourceTurnover, TurnoverReport, TurnoverStep,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
