use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::error::{ActionResponse, AppError, Result};
use crate::models::comment::{build_threads, CommentThread, CreateCommentData, SermonComment};
use crate::models::Sermon;

const MAX_AUTHOR_LEN: usize = 100;
const MAX_CONTENT_LEN: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct PostCommentRequest {
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub content: String,
    pub parent_id: Option<Uuid>,
}

impl PostCommentRequest {
    /// Trimmed author and content, or a validation error
    fn validate(&self) -> Result<(String, String)> {
        let author = self.author_name.trim();
        let content = self.content.trim();

        if author.is_empty() || content.is_empty() {
            return Err(AppError::validation("Name and comment are required"));
        }
        if author.chars().count() > MAX_AUTHOR_LEN {
            return Err(AppError::validation("Name is too long"));
        }
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(AppError::validation(format!(
                "Comment must be at most {} characters",
                MAX_CONTENT_LEN
            )));
        }

        Ok((author.to_string(), content.to_string()))
    }
}

/// Replies attach to top-level comments on the same sermon only.
fn check_reply_target(sermon_id: Uuid, parent: Option<&SermonComment>) -> Result<()> {
    let parent = parent
        .filter(|p| p.sermon_id == sermon_id)
        .ok_or_else(|| AppError::validation("Reply target not found on this sermon"))?;

    if parent.parent_id.is_some() {
        return Err(AppError::validation("Replies cannot be nested"));
    }

    Ok(())
}

async fn list_comments(
    State(state): State<AppState>,
    Path(sermon_id): Path<Uuid>,
) -> Result<Json<ActionResponse<Vec<CommentThread>>>> {
    let comments = SermonComment::list_for_sermon(&state.pool, sermon_id).await?;

    Ok(ActionResponse::data(build_threads(comments)))
}

async fn post_comment(
    State(state): State<AppState>,
    Path(sermon_id): Path<Uuid>,
    Json(req): Json<PostCommentRequest>,
) -> Result<(StatusCode, Json<ActionResponse<SermonComment>>)> {
    let (author_name, content) = req.validate()?;

    let sermon = Sermon::find_by_id(&state.pool, sermon_id)
        .await?
        .ok_or_else(|| AppError::not_found("Sermon not found"))?;

    if !sermon.enable_comments || !sermon.is_published {
        return Err(AppError::validation("Comments are disabled for this sermon"));
    }

    if let Some(parent_id) = req.parent_id {
        let parent = SermonComment::find_by_id(&state.pool, parent_id).await?;
        check_reply_target(sermon_id, parent.as_ref())?;
    }

    let comment = SermonComment::create(
        &state.pool,
        CreateCommentData {
            sermon_id,
            parent_id: req.parent_id,
            author_name,
            content,
        },
    )
    .await?;

    tracing::info!(sermon_id = %sermon_id, comment_id = %comment.id, "Comment posted");

    Ok((
        StatusCode::CREATED,
        ActionResponse::with_message("Comment posted", comment),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/sermons/:id/comments",
        get(list_comments).post(post_comment),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stored(sermon_id: Uuid, parent_id: Option<Uuid>) -> SermonComment {
        SermonComment {
            id: Uuid::new_v4(),
            sermon_id,
            parent_id,
            author_name: "Efua".to_string(),
            content: "Amen".to_string(),
            created_at: Utc::now(),
        }
    }

    fn request(author: &str, content: &str) -> PostCommentRequest {
        PostCommentRequest {
            author_name: author.to_string(),
            content: content.to_string(),
            parent_id: None,
        }
    }

    #[test]
    fn test_validation_trims() {
        let (author, content) = request("  Kofi ", " Amen! ").validate().unwrap();

        assert_eq!(author, "Kofi");
        assert_eq!(content, "Amen!");
    }

    #[test]
    fn test_blank_fields_rejected() {
        assert!(request("", "Amen").validate().is_err());
        assert!(request("Kofi", "   ").validate().is_err());
    }

    #[test]
    fn test_long_content_rejected() {
        let content = "a".repeat(MAX_CONTENT_LEN + 1);
        assert!(request("Kofi", &content).validate().is_err());
    }

    #[test]
    fn test_reply_to_top_level_comment_allowed() {
        let sermon_id = Uuid::new_v4();
        assert!(check_reply_target(sermon_id, Some(&stored(sermon_id, None))).is_ok());
    }

    #[test]
    fn test_reply_to_reply_rejected() {
        let sermon_id = Uuid::new_v4();
        let reply = stored(sermon_id, Some(Uuid::new_v4()));

        match check_reply_target(sermon_id, Some(&reply)) {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "Replies cannot be nested"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_reply_target_must_exist_on_sermon() {
        let sermon_id = Uuid::new_v4();
        assert!(check_reply_target(sermon_id, None).is_err());
        assert!(check_reply_target(sermon_id, Some(&stored(Uuid::new_v4(), None))).is_err());
    }
}
