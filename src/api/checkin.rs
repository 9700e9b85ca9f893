use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::attendance::UNKNOWN_SERVICE;
use crate::api::middleware::session::AppState;
use crate::error::{ActionResponse, AppError, Result};
use crate::models::attendance::{service_name, AttendanceRecord, AttendanceToken, TOKEN_ACTIVE};
use crate::models::visitor::{Visitor, VisitorData};
use crate::models::Member;
use crate::services::checkin_token;

/// Service and date a check-in applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckinContext {
    pub service_id: String,
    pub date: NaiveDate,
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenState {
    Usable(CheckinContext),
    Inactive,
    /// Active but past its TTL; expired on first sight
    Stale,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TokenValidation {
    Valid(CheckinContext),
    Invalid { message: String },
    Expired { message: String },
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MemberCheckinRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub token: Option<String>,
    pub service_id: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct VisitorCheckinRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub purpose: Option<String>,
    pub token: Option<String>,
    pub service_id: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CheckinResult {
    pub name: String,
    pub already_checked_in: bool,
    #[serde(flatten)]
    pub context: CheckinContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<AttendanceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_count: Option<i32>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Decides what a stored token allows, preferring the metadata embedded in it
fn assess_token(token: &AttendanceToken, now: DateTime<Utc>, ttl_hours: i64) -> TokenState {
    if token.status != TOKEN_ACTIVE {
        return TokenState::Inactive;
    }
    if checkin_token::is_expired(token.created_at, now, ttl_hours) {
        return TokenState::Stale;
    }

    let today = now.date_naive();
    let context = match checkin_token::decode_metadata(&token.token) {
        Some(meta) => CheckinContext {
            service_id: meta.service_id,
            date: NaiveDate::parse_from_str(&meta.date, "%Y-%m-%d").unwrap_or(today),
            service_name: meta.service_name,
        },
        None => CheckinContext {
            service_id: token.service_id.clone(),
            date: today,
            service_name: UNKNOWN_SERVICE.to_string(),
        },
    };

    TokenState::Usable(context)
}

async fn lookup_token(state: &AppState, raw: &str) -> Result<Option<TokenState>> {
    let Some(token) = AttendanceToken::find_by_token(&state.pool, raw).await? else {
        return Ok(None);
    };

    let assessed = assess_token(&token, Utc::now(), state.config.checkin_token_ttl_hours);
    if assessed == TokenState::Stale {
        AttendanceToken::expire(&state.pool, token.id).await?;
        tracing::info!(token_id = %token.id, "Check-in token auto-expired");
    }

    Ok(Some(assessed))
}

/// Resolves the service either from a QR token or from an explicit service id
async fn resolve_context(
    state: &AppState,
    token: Option<&str>,
    service_id: Option<&str>,
    date: Option<NaiveDate>,
) -> Result<CheckinContext> {
    if let Some(raw) = token {
        return match lookup_token(state, raw).await? {
            Some(TokenState::Usable(context)) => Ok(context),
            _ => Err(AppError::validation("Invalid or expired QR code")),
        };
    }

    let service_id = service_id.ok_or_else(|| AppError::validation("Service is required"))?;
    let name = service_name(service_id)
        .ok_or_else(|| AppError::validation(format!("Unknown service: {}", service_id)))?;

    Ok(CheckinContext {
        service_id: service_id.to_string(),
        date: date.unwrap_or_else(|| Utc::now().date_naive()),
        service_name: name.to_string(),
    })
}

async fn validate_token(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<ActionResponse<TokenValidation>>> {
    let raw = present(&query.token).ok_or_else(|| AppError::validation("Token is required"))?;

    let validation = match lookup_token(&state, raw).await? {
        None | Some(TokenState::Stale) => TokenValidation::Invalid {
            message: "Invalid QR code".to_string(),
        },
        Some(TokenState::Inactive) => TokenValidation::Expired {
            message: "This QR code has expired".to_string(),
        },
        Some(TokenState::Usable(context)) => TokenValidation::Valid(context),
    };

    Ok(ActionResponse::data(validation))
}

async fn member_checkin(
    State(state): State<AppState>,
    Json(req): Json<MemberCheckinRequest>,
) -> Result<Json<ActionResponse<CheckinResult>>> {
    let (Some(email), Some(phone)) = (present(&req.email), present(&req.phone)) else {
        return Err(AppError::validation("Email and phone are required"));
    };

    let context = resolve_context(
        &state,
        present(&req.token),
        present(&req.service_id),
        req.date,
    )
    .await?;

    let member = Member::find_by_contact(&state.pool, email, phone)
        .await?
        .ok_or_else(|| AppError::not_found("No member found with that email and phone number"))?;

    if !member.is_active() {
        return Err(AppError::validation("This membership is not active"));
    }

    let attendance =
        AttendanceRecord::check_in_member(&state.pool, member.id, &context.service_id, context.date)
            .await?;
    let already_checked_in = attendance.is_none();

    tracing::info!(
        member_id = %member.id,
        service_id = %context.service_id,
        date = %context.date,
        already_checked_in,
        "Member check-in"
    );

    let message = if already_checked_in {
        "You have already checked in for this service"
    } else {
        "Check-in successful"
    };

    Ok(ActionResponse::with_message(
        message,
        CheckinResult {
            name: member.full_name(),
            already_checked_in,
            context,
            attendance,
            visit_count: None,
        },
    ))
}

async fn visitor_checkin(
    State(state): State<AppState>,
    Json(req): Json<VisitorCheckinRequest>,
) -> Result<Json<ActionResponse<CheckinResult>>> {
    let (Some(name), Some(phone)) = (present(&req.name), present(&req.phone)) else {
        return Err(AppError::validation("Name and phone are required"));
    };

    let context = resolve_context(
        &state,
        present(&req.token),
        present(&req.service_id),
        req.date,
    )
    .await?;

    let data = VisitorData {
        name: name.to_string(),
        phone: phone.to_string(),
        email: present(&req.email).map(str::to_string),
        source: present(&req.source).map(str::to_string),
        purpose: present(&req.purpose).map(str::to_string),
    };

    let visitor = match Visitor::find_returning(&state.pool, name, phone).await? {
        Some(existing) => Visitor::record_return(&state.pool, existing.id, &data, context.date).await?,
        None => Visitor::create(&state.pool, &data, context.date).await?,
    };

    let attendance =
        AttendanceRecord::check_in_visitor(&state.pool, visitor.id, &context.service_id, context.date)
            .await?;
    let already_checked_in = attendance.is_none();

    tracing::info!(
        visitor_id = %visitor.id,
        visit_count = visitor.visit_count,
        service_id = %context.service_id,
        already_checked_in,
        "Visitor check-in"
    );

    let message = if visitor.visit_count > 1 {
        "Welcome back!"
    } else {
        "Welcome! Thank you for visiting"
    };

    Ok(ActionResponse::with_message(
        message,
        CheckinResult {
            name: visitor.name,
            already_checked_in,
            context,
            attendance,
            visit_count: Some(visitor.visit_count),
        },
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/checkin/validate", get(validate_token))
        .route("/api/checkin/member", post(member_checkin))
        .route("/api/checkin/visitor", post(visitor_checkin))
}
