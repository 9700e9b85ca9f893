use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SermonComment {
    pub id: Uuid,
    pub sermon_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A top-level comment with its replies
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: SermonComment,
    pub replies: Vec<SermonComment>,
}

#[derive(Debug, Clone)]
pub struct CreateCommentData {
    pub sermon_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub author_name: String,
    pub content: String,
}

impl SermonComment {
    pub async fn create(pool: &PgPool, data: CreateCommentData) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO sermon_comments (sermon_id, parent_id, author_name, content)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.sermon_id)
        .bind(data.parent_id)
        .bind(&data.author_name)
        .bind(&data.content)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM sermon_comments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Every comment on a sermon, oldest first
    pub async fn list_for_sermon(pool: &PgPool, sermon_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM sermon_comments WHERE sermon_id = $1 ORDER BY created_at ASC",
        )
        .bind(sermon_id)
        .fetch_all(pool)
        .await
    }
}

/// Groups comments into threads: top-level comments newest first, replies
/// oldest first. Replies whose parent is missing are dropped.
pub fn build_threads(comments: Vec<SermonComment>) -> Vec<CommentThread> {
    let (top_level, replies): (Vec<_>, Vec<_>) =
        comments.into_iter().partition(|c| c.parent_id.is_none());

    let mut threads: Vec<CommentThread> = top_level
        .into_iter()
        .map(|comment| CommentThread {
            comment,
            replies: Vec::new(),
        })
        .collect();

    for reply in replies {
        if let Some(thread) = threads
            .iter_mut()
            .find(|t| Some(t.comment.id) == reply.parent_id)
        {
            thread.replies.push(reply);
        }
    }

    for thread in &mut threads {
        thread.replies.sort_by_key(|r| r.created_at);
    }
    threads.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));

    threads
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn comment(parent_id: Option<Uuid>, minutes: i64) -> SermonComment {
        SermonComment {
            id: Uuid::new_v4(),
            sermon_id: Uuid::nil(),
            parent_id,
            author_name: "Ama".to_string(),
            content: format!("posted at {}", minutes),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_threads_order() {
        let first = comment(None, 0);
        let second = comment(None, 10);
        let late_reply = comment(Some(first.id), 30);
        let early_reply = comment(Some(first.id), 5);

        let threads = build_threads(vec![
            first.clone(),
            late_reply.clone(),
            second.clone(),
            early_reply.clone(),
        ]);

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.id, second.id);
        assert_eq!(threads[1].comment.id, first.id);

        let reply_ids: Vec<Uuid> = threads[1].replies.iter().map(|r| r.id).collect();
        assert_eq!(reply_ids, vec![early_reply.id, late_reply.id]);
    }

    #[test]
    fn test_orphan_replies_are_dropped() {
        let threads = build_threads(vec![comment(Some(Uuid::new_v4()), 1)]);
        assert!(threads.is_empty());
    }

    #[test]
    fn test_thread_serializes_flat() {
        let thread = build_threads(vec![comment(None, 0)]).remove(0);
        let json = serde_json::to_value(&thread).unwrap();

        assert_eq!(json["author_name"], "Ama");
        assert!(json["replies"].as_array().unwrap().is_empty());
    }
}
