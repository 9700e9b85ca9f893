use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// Append-only audit entry shown on the dashboard
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub activity_type: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    /// Records an activity. Accepts a pool or an open transaction.
    pub async fn record<'e>(
        executor: impl PgExecutor<'e>,
        activity_type: &str,
        title: &str,
        description: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO activity_logs (activity_type, title, description) VALUES ($1, $2, $3)",
        )
        .bind(activity_type)
        .bind(title)
        .bind(description)
        .execute(executor)
        .await?;

        Ok(())
    }
}
