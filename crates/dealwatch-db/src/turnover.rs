//! Turnover reports computed from persisted snapshots.

use dealwatch_core::{analyze_snapshots, TurnoverReport};
use sqlx::PgPool;

use crate::sessions::{get_session, MonitoringSessionRow};
use crate::snapshots::load_session_observations;
use crate::DbError;

/// A turnover report together with the session it describes.
#[derive(Debug, Clone)]
pub struct SessionTurnover {
    pub session: MonitoringSessionRow,
    /// `true` while the session is still open; later snapshots may change
    /// the report.
    pub provisional: bool,
    pub report: TurnoverReport,
}

/// Analyzes every snapshot recorded for `session_id`.
///
/// Open sessions are analyzed too; the result is flagged provisional.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the session does not exist, or
/// [`DbError::Sqlx`] if a query fails.
pub async fn analyze_session(pool: &PgPool, session_id: i64) -> Result<SessionTurnover, DbError> {
    let session = get_session(pool, session_id).await?;
    let observations = load_session_observations(pool, session_id).await?;
    let report = analyze_snapshots(&observations, session.check_interval_minutes);

    tracing::debug!(
        session = %session.public_id,
        snapshots = report.snapshot_count,
        steps = report.steps.len(),
        "analyzed session turnover"
    );

    Ok(SessionTurnover {
        provisional: !session.is_closed(),
        session,
        report,
    })
}
