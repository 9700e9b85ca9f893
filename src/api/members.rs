use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::error::{ActionResponse, AppError, Result};
use crate::models::member::{CreateMemberData, Member};
use crate::services::storage::decode_data_url;

#[derive(Debug, Deserialize)]
pub struct MemberQuery {
    pub search: Option<String>,
}

/// Member details with an optional photo as a base64 data URL.
#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    #[serde(flatten)]
    pub member: CreateMemberData,
    #[serde(rename = "photoData")]
    pub photo_data: Option<String>,
}

fn validate(data: &CreateMemberData) -> Result<()> {
    let missing: Vec<&str> = [
        ("first_name", &data.first_name),
        ("last_name", &data.last_name),
        ("email", &data.email),
        ("phone", &data.phone),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();

    if !missing.is_empty() {
        return Err(AppError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    if !data.email.contains('@') {
        return Err(AppError::validation("Invalid email address"));
    }

    Ok(())
}

fn duplicate_email(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::validation("A member with this email already exists")
        }
        other => AppError::Database(other),
    }
}

/// Stores the photo, if one was sent, and returns its public path.
async fn save_photo(state: &AppState, request: &MemberRequest) -> Result<Option<String>> {
    let Some(data_url) = request.photo_data.as_deref().filter(|d| !d.is_empty()) else {
        return Ok(None);
    };

    let file = decode_data_url(data_url, "photo")
        .filter(|f| f.is_image())
        .ok_or_else(|| AppError::validation("Invalid photo data"))?;

    Ok(state.media.save("members", &file).await?)
}

async fn list_members(
    State(state): State<AppState>,
    Query(query): Query<MemberQuery>,
) -> Result<Json<ActionResponse<Vec<Member>>>> {
    let members = Member::search(&state.pool, query.search.as_deref()).await?;

    Ok(ActionResponse::data(members))
}

async fn create_member(
    State(state): State<AppState>,
    Json(request): Json<MemberRequest>,
) -> Result<(StatusCode, Json<ActionResponse<Member>>)> {
    validate(&request.member)?;

    let photo_path = save_photo(&state, &request).await?;

    let member = match Member::create(&state.pool, &request.member, photo_path.as_deref()).await {
        Ok(member) => member,
        Err(e) => {
            state.media.delete(photo_path.as_deref()).await;
            return Err(duplicate_email(e));
        }
    };

    tracing::info!(member_id = %member.id, "Member created");

    Ok((
        StatusCode::CREATED,
        ActionResponse::with_message("Member added successfully", member),
    ))
}

async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<MemberRequest>,
) -> Result<Json<ActionResponse<Member>>> {
    validate(&request.member)?;

    let existing = Member::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))?;

    let photo_path = save_photo(&state, &request).await?;

    let updated = Member::update(&state.pool, id, &request.member, photo_path.as_deref()).await;
    let member = match updated {
        Ok(Some(member)) => member,
        Ok(None) => {
            state.media.delete(photo_path.as_deref()).await;
            return Err(AppError::not_found("Member not found"));
        }
        Err(e) => {
            state.media.delete(photo_path.as_deref()).await;
            return Err(duplicate_email(e));
        }
    };

    if photo_path.is_some() {
        state.media.delete(existing.photo_path.as_deref()).await;
    }

    tracing::info!(member_id = %id, "Member updated");

    Ok(ActionResponse::with_message("Member updated successfully", member))
}

async fn delete_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse<()>>> {
    let member = Member::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))?;

    state.media.delete(member.photo_path.as_deref()).await;
    Member::delete(&state.pool, id).await?;

    tracing::info!(member_id = %id, "Member deleted");

    Ok(ActionResponse::message("Member deleted successfully"))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/members", get(list_members).post(create_member))
        .route("/members/:id", put(update_member).delete(delete_member))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(email: &str, phone: &str) -> CreateMemberData {
        CreateMemberData {
            first_name: "Ama".to_string(),
            last_name: "Serwaa".to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            gender: Some("Female".to_string()),
            date_of_birth: None,
            status: None,
            church_group: None,
            leadership_role: None,
        }
    }

    #[test]
    fn test_missing_fields_listed() {
        match validate(&data(" ", "")) {
            Err(AppError::Validation(msg)) => {
                assert_eq!(msg, "Missing required fields: email, phone")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_request_reads_flat_member_and_photo() {
        let request: MemberRequest = serde_json::from_value(serde_json::json!({
            "first_name": "Ama",
            "last_name": "Serwaa",
            "email": "ama@example.com",
            "phone": "0241234567",
            "photoData": "data:image/png;base64,cG5n"
        }))
        .unwrap();

        assert_eq!(request.member.first_name, "Ama");
        assert_eq!(request.member.status, None);
        assert_eq!(request.photo_data.as_deref(), Some("data:image/png;base64,cG5n"));
    }

    #[test]
    fn test_email_shape_checked() {
        assert!(validate(&data("ama.example.com", "0241234567")).is_err());
        assert!(validate(&data("ama@example.com", "0241234567")).is_ok());
    }
}
