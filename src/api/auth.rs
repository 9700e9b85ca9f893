use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::auth::get_authenticated_admin;
use crate::api::middleware::session::{AppState, SESSION_KEY_ADMIN_ID, SESSION_KEY_ADMIN_USERNAME};
use crate::error::{ActionResponse, AppError, Result};
use crate::models::Admin;
use crate::services::password;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AdminIdentity {
    pub admin_id: Uuid,
    pub username: Option<String>,
}

/// Verifies the credentials and starts an admin session
async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ActionResponse<AdminIdentity>>> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("Username and password are required"));
    }

    let admin = Admin::find_by_username(&state.pool, username).await?;

    // Same response for unknown users and wrong passwords
    let Some(admin) = admin.filter(|a| password::verify(&req.password, &a.password_hash)) else {
        tracing::warn!(username = %username, "Failed admin login");
        return Err(AppError::Unauthorized);
    };

    // New session id on privilege change
    session
        .cycle_id()
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;

    session
        .insert(SESSION_KEY_ADMIN_ID, admin.id)
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;

    session
        .insert(SESSION_KEY_ADMIN_USERNAME, admin.username.clone())
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;

    tracing::info!(admin_id = %admin.id, "Admin logged in");

    Ok(ActionResponse::with_message(
        "Logged in",
        AdminIdentity {
            admin_id: admin.id,
            username: Some(admin.username),
        },
    ))
}

/// Ends the admin session
async fn logout(session: Session) -> Result<Json<ActionResponse<()>>> {
    session
        .flush()
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;

    Ok(ActionResponse::message("Logged out"))
}

async fn current_admin(session: Session) -> Result<Json<ActionResponse<AdminIdentity>>> {
    let admin = get_authenticated_admin(&session).await?;

    Ok(ActionResponse::data(AdminIdentity {
        admin_id: admin.admin_id,
        username: admin.username,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(current_admin))
}
