use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::error::{ActionResponse, AppError, Result};
use crate::models::attendance::{
    service_name, service_scope, services, AttendanceEntry, AttendanceRecord, AttendanceStats,
    AttendanceToken, ServiceOption,
};
use crate::models::member::Member;
use crate::models::visitor::{Visitor, VisitorCheckIn};
use crate::services::attendance_sync::{watch_changes, SyncSignal};
use crate::services::checkin_token;
use crate::services::qr_generator::{checkin_url, generate_qr_png, generate_qr_svg, CheckinTarget};

pub(crate) const UNKNOWN_SERVICE: &str = "Unknown Service";

#[derive(Debug, Deserialize)]
pub struct AttendanceQuery {
    pub service_id: Option<String>,
    pub date: Option<NaiveDate>,
}

impl AttendanceQuery {
    fn scope(&self) -> Option<&str> {
        service_scope(self.service_id.as_deref())
    }

    fn date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    pub service_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub service_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub token: AttendanceToken,
    pub checkin_url: String,
}

#[derive(Debug, Deserialize)]
pub struct QrQuery {
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QrFormat {
    Svg,
    Png,
}

impl QrFormat {
    fn parse(value: Option<&str>) -> Result<Self> {
        match value.map(str::to_ascii_lowercase).as_deref() {
            None | Some("svg") => Ok(QrFormat::Svg),
            Some("png") => Ok(QrFormat::Png),
            Some(other) => Err(AppError::validation(format!("Unsupported QR format: {}", other))),
        }
    }
}

async fn list_services() -> Json<ActionResponse<Vec<ServiceOption>>> {
    ActionResponse::data(services())
}

async fn attendance_stats(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<ActionResponse<AttendanceStats>>> {
    let stats = AttendanceRecord::stats(
        &state.pool,
        query.scope(),
        query.date(),
        &state.config.timezone,
    )
    .await?;

    Ok(ActionResponse::data(stats))
}

async fn attendance_records(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<ActionResponse<Vec<AttendanceEntry>>>> {
    let records = AttendanceRecord::list(&state.pool, query.scope(), query.date()).await?;

    Ok(ActionResponse::data(records))
}

async fn absent_members(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<ActionResponse<Vec<Member>>>> {
    let members = Member::absent(&state.pool, query.scope(), query.date()).await?;

    Ok(ActionResponse::data(members))
}

async fn list_visitors(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<ActionResponse<Vec<VisitorCheckIn>>>> {
    let visitors = Visitor::checked_in(&state.pool, query.scope(), query.date()).await?;

    Ok(ActionResponse::data(visitors))
}

async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse<()>>> {
    if !AttendanceRecord::delete(&state.pool, id).await? {
        return Err(AppError::not_found("Attendance record not found"));
    }

    tracing::info!(attendance_id = %id, "Attendance record deleted");

    Ok(ActionResponse::message("Attendance record deleted"))
}

async fn sync_signal(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<ActionResponse<SyncSignal>>> {
    let signal = AttendanceRecord::sync_signal(&state.pool, query.scope(), query.date()).await?;

    Ok(ActionResponse::data(signal))
}

/// Pushes a `changed` event whenever the check-ins for the service/date move
async fn sync_stream(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let pool = state.pool.clone();
    let scope = query.scope().map(str::to_string);
    let date = query.date();
    let interval = Duration::from_millis(state.config.sync_poll_interval_ms);

    tracing::debug!(service_id = ?scope, %date, "Attendance stream opened");

    let changes = watch_changes(interval, move || {
        let pool = pool.clone();
        let scope = scope.clone();
        async move { AttendanceRecord::sync_signal(&pool, scope.as_deref(), date).await }
    });

    let events = changes.filter_map(|signal| {
        match Event::default().event("changed").json_data(signal) {
            Ok(event) => Some(Ok::<_, Infallible>(event)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode sync event");
                None
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<IssueTokenRequest>,
) -> Result<(StatusCode, Json<ActionResponse<IssuedToken>>)> {
    let service_id = req
        .service_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("Service is required"))?;

    let date = req.date.unwrap_or_else(|| Utc::now().date_naive());
    let name = req
        .service_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| service_name(service_id))
        .unwrap_or(UNKNOWN_SERVICE);

    let raw = checkin_token::issue(service_id, date, name, Utc::now()).map_err(anyhow::Error::from)?;
    let token = AttendanceToken::replace_active(
        &state.pool,
        service_id,
        &raw,
        state.config.token_retention_days,
    )
    .await?;

    let url = checkin_url(state.config.public_base_url(), CheckinTarget::Token(&token.token))?;

    tracing::info!(service_id = %service_id, %date, token_id = %token.id, "Check-in token issued");

    Ok((
        StatusCode::CREATED,
        ActionResponse::with_message(
            "QR token generated",
            IssuedToken {
                token,
                checkin_url: url,
            },
        ),
    ))
}

/// Latest active token for the service, expiring it first when past its TTL
async fn current_token(state: &AppState, service_id: &str) -> Result<Option<AttendanceToken>> {
    let Some(token) = AttendanceToken::latest_active(&state.pool, service_id).await? else {
        return Ok(None);
    };

    if checkin_token::is_expired(token.created_at, Utc::now(), state.config.checkin_token_ttl_hours) {
        AttendanceToken::expire(&state.pool, token.id).await?;
        tracing::info!(service_id = %service_id, token_id = %token.id, "Check-in token auto-expired");
        return Ok(None);
    }

    Ok(Some(token))
}

async fn active_token(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> Result<Json<ActionResponse<Option<IssuedToken>>>> {
    let issued = match current_token(&state, &service_id).await? {
        Some(token) => {
            let url = checkin_url(state.config.public_base_url(), CheckinTarget::Token(&token.token))?;
            Some(IssuedToken {
                token,
                checkin_url: url,
            })
        }
        None => None,
    };

    Ok(ActionResponse::data(issued))
}

async fn qr_image(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    Query(query): Query<QrQuery>,
) -> Result<Response> {
    let format = QrFormat::parse(query.format.as_deref())?;

    let token = current_token(&state, &service_id).await?;
    let target = match &token {
        Some(token) => CheckinTarget::Token(&token.token),
        None => CheckinTarget::Service(&service_id),
    };
    let url = checkin_url(state.config.public_base_url(), target)?;

    let response = match format {
        QrFormat::Svg => ([(header::CONTENT_TYPE, "image/svg+xml")], generate_qr_svg(&url)?).into_response(),
        QrFormat::Png => ([(header::CONTENT_TYPE, "image/png")], generate_qr_png(&url)?).into_response(),
    };

    Ok(response)
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/attendance/services", get(list_services))
        .route("/attendance/stats", get(attendance_stats))
        .route("/attendance/records", get(attendance_records))
        .route("/attendance/absent", get(absent_members))
        .route("/visitors", get(list_visitors))
        .route("/attendance/sync", get(sync_signal))
        .route("/attendance/stream", get(sync_stream))
        .route("/attendance/qr-token", post(issue_token))
        .route("/attendance/qr-token/:service_id", get(active_token))
        .route("/attendance/qr/:service_id", get(qr_image))
        .route("/attendance/:id", delete(delete_record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_format_parsing() {
        assert_eq!(QrFormat::parse(None).unwrap(), QrFormat::Svg);
        assert_eq!(QrFormat::parse(Some("PNG")).unwrap(), QrFormat::Png);
        assert!(QrFormat::parse(Some("gif")).is_err());
    }

    #[test]
    fn test_query_scope_and_default_date() {
        let all = AttendanceQuery {
            service_id: Some("0".to_string()),
            date: None,
        };
        assert_eq!(all.scope(), None);
        assert_eq!(all.date(), Utc::now().date_naive());

        let one = AttendanceQuery {
            service_id: Some("friday-prayer".to_string()),
            date: NaiveDate::from_ymd_opt(2025, 5, 2),
        };
        assert_eq!(one.scope(), Some("friday-prayer"));
        assert_eq!(one.date(), NaiveDate::from_ymd_opt(2025, 5, 2).unwrap());
    }
}
