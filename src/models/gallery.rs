use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const MEDIA_PHOTO: &str = "photo";
pub const MEDIA_VIDEO: &str = "video";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GalleryAlbum {
    pub id: Uuid,
    pub album_name: String,
    pub event_date: NaiveDate,
    pub category: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub photographer: Option<String>,
    pub status: String,
    pub cover_image: Option<String>,
    pub media_count: i32,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GalleryMedia {
    pub id: Uuid,
    pub album_id: Uuid,
    pub media_type: String,
    pub file_path: String,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Album listing row with per-type counts and the resolved cover
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AlbumSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub album: GalleryAlbum,
    pub photo_count: i64,
    pub video_count: i64,
    pub cover: Option<String>,
}

/// Media listing row with its album's name and category
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MediaItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub media: GalleryMedia,
    pub album_name: String,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct AlbumData {
    pub album_name: String,
    pub event_date: NaiveDate,
    pub category: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub photographer: Option<String>,
    pub status: String,
}

/// Metadata edits for an existing album; unset fields keep their value
#[derive(Debug, Clone, Default)]
pub struct AlbumUpdate {
    pub album_name: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub photographer: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GalleryFilter {
    pub view: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl GalleryFilter {
    fn category(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != "all")
    }

    fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s))
    }
}

/// Classifies an upload by content type; anything else is not gallery media
pub fn media_type_for(content_type: Option<&str>) -> Option<&'static str> {
    match content_type {
        Some(t) if t.starts_with("image/") => Some(MEDIA_PHOTO),
        Some(t) if t.starts_with("video/") => Some(MEDIA_VIDEO),
        _ => None,
    }
}

impl GalleryAlbum {
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        data: &AlbumData,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO gallery_albums (
                album_name, event_date, category, description, tags, photographer, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&data.album_name)
        .bind(data.event_date)
        .bind(&data.category)
        .bind(&data.description)
        .bind(&data.tags)
        .bind(&data.photographer)
        .bind(&data.status)
        .fetch_one(executor)
        .await
    }

    pub async fn update_metadata<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
        update: &AlbumUpdate,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE gallery_albums SET
                album_name = COALESCE($2, album_name),
                event_date = COALESCE($3, event_date),
                category = COALESCE($4, category),
                description = COALESCE($5, description),
                tags = COALESCE($6, tags),
                photographer = COALESCE($7, photographer),
                status = COALESCE($8, status)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.album_name)
        .bind(update.event_date)
        .bind(&update.category)
        .bind(&update.description)
        .bind(&update.tags)
        .bind(&update.photographer)
        .bind(&update.status)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM gallery_albums WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Replaces the cover when a new one was uploaded; returns the old path
    pub async fn set_cover<'e>(
        executor: impl PgExecutor<'e>,
        id: Uuid,
        cover_image: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<String>>(
            r#"
            UPDATE gallery_albums album SET cover_image = $2
            FROM gallery_albums previous
            WHERE album.id = $1 AND previous.id = album.id
            RETURNING previous.cover_image
            "#,
        )
        .bind(id)
        .bind(cover_image)
        .fetch_optional(executor)
        .await
        .map(Option::flatten)
    }

    /// Sets `media_count` from the media rows
    pub async fn recount<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE gallery_albums
            SET media_count = (SELECT COUNT(*) FROM gallery_media WHERE album_id = $1)::INTEGER
            WHERE id = $1
            RETURNING media_count
            "#,
        )
        .bind(id)
        .fetch_one(executor)
        .await
    }

    /// Published albums, newest event first
    pub async fn list(pool: &PgPool, filter: &GalleryFilter) -> Result<Vec<AlbumSummary>, sqlx::Error> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT a.*,
                (SELECT COUNT(*) FROM gallery_media m
                    WHERE m.album_id = a.id AND m.media_type = 'photo') AS photo_count,
                (SELECT COUNT(*) FROM gallery_media m
                    WHERE m.album_id = a.id AND m.media_type = 'video') AS video_count,
                COALESCE(
                    a.cover_image,
                    (SELECT m.file_path FROM gallery_media m
                        WHERE m.album_id = a.id AND m.media_type = 'photo'
                        ORDER BY m.uploaded_at ASC LIMIT 1),
                    (SELECT m.file_path FROM gallery_media m
                        WHERE m.album_id = a.id
                        ORDER BY m.uploaded_at ASC LIMIT 1)
                ) AS cover
            FROM gallery_albums a
            WHERE a.status = 'published'
            "#,
        );

        if let Some(category) = filter.category() {
            query.push(" AND a.category = ").push_bind(category.to_string());
        }
        if let Some(pattern) = filter.search_pattern() {
            query
                .push(" AND (a.album_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR a.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        query.push(" ORDER BY a.event_date DESC, a.created_at DESC");

        query.build_query_as::<AlbumSummary>().fetch_all(pool).await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM gallery_albums WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl GalleryMedia {
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        album_id: Uuid,
        media_type: &str,
        file_path: &str,
        title: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO gallery_media (album_id, media_type, file_path, title)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(album_id)
        .bind(media_type)
        .bind(file_path)
        .bind(title)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM gallery_media WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn for_album(pool: &PgPool, album_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM gallery_media WHERE album_id = $1 ORDER BY uploaded_at ASC",
        )
        .bind(album_id)
        .fetch_all(pool)
        .await
    }

    /// Deletes the given media of one album, returning the removed rows
    pub async fn delete_many<'e>(
        executor: impl PgExecutor<'e>,
        album_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "DELETE FROM gallery_media WHERE album_id = $1 AND id = ANY($2) RETURNING *",
        )
        .bind(album_id)
        .bind(ids)
        .fetch_all(executor)
        .await
    }

    pub async fn delete<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM gallery_media WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Media of published albums, newest first. `view` narrows to photos or videos.
    pub async fn list(pool: &PgPool, filter: &GalleryFilter) -> Result<Vec<MediaItem>, sqlx::Error> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT m.*, a.album_name, a.category
            FROM gallery_media m
            JOIN gallery_albums a ON a.id = m.album_id
            WHERE a.status = 'published'
            "#,
        );

        match filter.view.as_deref() {
            Some("photos") => {
                query.push(" AND m.media_type = ").push_bind(MEDIA_PHOTO);
            }
            Some("videos") => {
                query.push(" AND m.media_type = ").push_bind(MEDIA_VIDEO);
            }
            _ => {}
        }

        if let Some(category) = filter.category() {
            query.push(" AND a.category = ").push_bind(category.to_string());
        }
        if let Some(pattern) = filter.search_pattern() {
            query
                .push(" AND (a.album_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR m.title ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        query.push(" ORDER BY m.uploaded_at DESC");

        query.build_query_as::<MediaItem>().fetch_all(pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_content_type() {
        assert_eq!(media_type_for(Some("image/jpeg")), Some(MEDIA_PHOTO));
        assert_eq!(media_type_for(Some("video/mp4")), Some(MEDIA_VIDEO));
        assert_eq!(media_type_for(Some("application/pdf")), None);
        assert_eq!(media_type_for(None), None);
    }

    #[test]
    fn test_filter_ignores_all_category() {
        let filter = GalleryFilter {
            view: None,
            category: Some("all".to_string()),
            search: Some("  choir ".to_string()),
        };

        assert_eq!(filter.category(), None);
        assert_eq!(filter.search_pattern().as_deref(), Some("%choir%"));
    }
}
