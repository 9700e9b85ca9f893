use axum::{extract::Request, middleware::Next, response::Response};
use tower_sessions::Session;
use uuid::Uuid;

use super::session::{SESSION_KEY_ADMIN_ID, SESSION_KEY_ADMIN_USERNAME};
use crate::error::AppError;

/// Middleware that requires a logged-in admin
pub async fn require_auth(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let admin = get_authenticated_admin(&session).await?;
    tracing::debug!(admin_id = %admin.admin_id, path = %request.uri().path(), "Admin request");

    Ok(next.run(request).await)
}

/// The admin attached to the current session
#[derive(Debug, Clone)]
pub struct AuthenticatedAdmin {
    pub admin_id: Uuid,
    pub username: Option<String>,
}

/// Extracts the authenticated admin from the session
pub async fn get_authenticated_admin(session: &Session) -> Result<AuthenticatedAdmin, AppError> {
    let admin_id: Uuid = session
        .get(SESSION_KEY_ADMIN_ID)
        .await
        .map_err(|e| AppError::Session(e.to_string()))?
        .ok_or(AppError::Unauthorized)?;

    let username: Option<String> = session
        .get(SESSION_KEY_ADMIN_USERNAME)
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;

    Ok(AuthenticatedAdmin { admin_id, username })
}
