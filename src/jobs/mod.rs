// Background jobs

pub mod token_cleanup;

use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::Config;

/// Top of every hour
const TOKEN_CLEANUP_SCHEDULE: &str = "0 0 * * * *";

/// Starts the scheduler with every background job registered
pub async fn start_scheduler(pool: PgPool, config: &Config) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create job scheduler: {:?}", e))?;

    let ttl_hours = config.checkin_token_ttl_hours;
    let retention_days = config.token_retention_days;

    let job = Job::new_async(TOKEN_CLEANUP_SCHEDULE, move |_id, _scheduler| {
        let pool = pool.clone();
        Box::pin(async move {
            if let Err(e) = token_cleanup::cleanup_tokens(&pool, ttl_hours, retention_days).await {
                tracing::error!(error = %e, "Check-in token cleanup failed");
            }
        })
    })
    .map_err(|e| anyhow::anyhow!("Invalid token cleanup schedule: {:?}", e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to register token cleanup: {:?}", e))?;

    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start job scheduler: {:?}", e))?;

    tracing::info!(schedule = TOKEN_CLEANUP_SCHEDULE, "Background jobs scheduled");

    Ok(scheduler)
}
