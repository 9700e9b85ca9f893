use sqlx::PgPool;

use crate::models::AttendanceToken;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub expired: u64,
    pub purged: u64,
}

/// Background job that keeps the check-in token table small
///
/// 1. Active tokens older than `ttl_hours` are marked expired
/// 2. Tokens older than `retention_days` are deleted
pub async fn cleanup_tokens(
    pool: &PgPool,
    ttl_hours: i64,
    retention_days: i64,
) -> Result<CleanupStats, sqlx::Error> {
    let expired = AttendanceToken::expire_stale(pool, ttl_hours).await?;
    let purged = AttendanceToken::purge_older_than(pool, retention_days).await?;

    let stats = CleanupStats { expired, purged };

    tracing::info!(?stats, "Check-in token cleanup completed");

    Ok(stats)
}
