use chrono::Utc;
use sqlx::PgPool;

use crate::models::member::Member;

#[derive(Debug)]
pub struct ExpiryStats {
    pub expired: u64,
}

/// Background job that flips active memberships past their end date to expired
pub async fn expire_lapsed_memberships(pool: &PgPool) -> Result<ExpiryStats, sqlx::Error> {
    let expired = Member::expire_lapsed(pool, Utc::now()).await?;

    let stats = ExpiryStats { expired };
    if stats.expired > 0 {
        tracing::info!(?stats, "Membership expiry job completed");
    } else {
        tracing::debug!(?stats, "Membership expiry job completed");
    }

    Ok(stats)
}
