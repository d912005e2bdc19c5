use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::models::access_code::AccessCode;

#[derive(Debug)]
pub struct SweepStats {
    pub cutoff: DateTime<Utc>,
    pub deleted: u64,
}

/// Codes kept this long past expiry remain visible for auditing
pub fn sweep_cutoff(now: DateTime<Utc>, retention_hours: i64) -> DateTime<Utc> {
    now - Duration::hours(retention_hours.max(0))
}

/// Background job that removes stale access codes
///
/// A code is stale when it expired before the retention cutoff and never
/// authorized an attendance event. Codes referenced by events are kept.
pub async fn sweep_expired_codes(
    pool: &PgPool,
    retention_hours: i64,
) -> Result<SweepStats, sqlx::Error> {
    let cutoff = sweep_cutoff(Utc::now(), retention_hours);
    let deleted = AccessCode::delete_stale(pool, cutoff).await?;

    let stats = SweepStats { cutoff, deleted };
    tracing::info!(?stats, "Access code sweep completed");

    Ok(stats)
}
