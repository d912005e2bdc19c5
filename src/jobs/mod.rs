// Jobs module - Scheduled maintenance

pub mod code_sweeper;
pub mod membership_expiry;

use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::Config;

/// Runs every maintenance job once
pub async fn run_maintenance(pool: &PgPool, retention_hours: i64) {
    if let Err(e) = code_sweeper::sweep_expired_codes(pool, retention_hours).await {
        tracing::error!(error = %e, "Access code sweep failed");
    }
    if let Err(e) = membership_expiry::expire_lapsed_memberships(pool).await {
        tracing::error!(error = %e, "Membership expiry job failed");
    }
}

/// Starts the cron scheduler with the maintenance schedule from config
pub async fn start_scheduler(
    pool: PgPool,
    config: &Config,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    let retention_hours = config.access_code_retention_hours;

    let job = Job::new_async(config.maintenance_schedule.as_str(), move |_id, _scheduler| {
        let pool = pool.clone();
        Box::pin(async move {
            run_maintenance(&pool, retention_hours).await;
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(
        schedule = %config.maintenance_schedule,
        "Maintenance scheduler started"
    );

    Ok(scheduler)
}
