use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Instant;

use crate::api::middleware::session::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub database: ServiceHealth,
    pub upload_dir: ServiceHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    fn healthy(start: Instant) -> Self {
        Self {
            status: "healthy".to_string(),
            response_time_ms: start.elapsed().as_millis(),
            error: None,
        }
    }

    fn unhealthy(start: Instant, error: String) -> Self {
        Self {
            status: "unhealthy".to_string(),
            response_time_ms: start.elapsed().as_millis(),
            error: Some(error),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Health check endpoint
/// Returns 200 if the database and upload directory are usable, 503 otherwise
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();

    let db_health = check_database(&state.pool).await;
    let upload_health = check_upload_dir(state.media.root()).await;

    let all_healthy = db_health.is_healthy() && upload_health.is_healthy();

    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dependencies: DependencyStatus {
            database: db_health,
            upload_dir: upload_health,
        },
    };

    tracing::info!(
        status = %response.status,
        duration_ms = start.elapsed().as_millis(),
        "Health check completed"
    );

    (status_code, Json(response))
}

async fn check_database(pool: &PgPool) -> ServiceHealth {
    let start = Instant::now();

    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => ServiceHealth::healthy(start),
        Err(e) => ServiceHealth::unhealthy(start, format!("Database error: {}", e)),
    }
}

/// Uploads fail late, so a missing upload root is reported up front
async fn check_upload_dir(root: &std::path::Path) -> ServiceHealth {
    let start = Instant::now();

    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => ServiceHealth::healthy(start),
        Ok(_) => ServiceHealth::unhealthy(start, "Upload path is not a directory".to_string()),
        Err(e) => ServiceHealth::unhealthy(start, format!("Upload directory error: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_upload_dir_is_unhealthy() {
        let health = check_upload_dir(std::path::Path::new("/nonexistent/chapel-uploads")).await;

        assert!(!health.is_healthy());
        assert!(health.error.is_some());
    }

    #[tokio::test]
    async fn test_existing_dir_is_healthy() {
        let health = check_upload_dir(&std::env::temp_dir()).await;

        assert!(health.is_healthy());
    }
}
