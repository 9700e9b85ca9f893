use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Sermon {
    pub id: Uuid,
    pub title: String,
    pub speaker: String,
    pub sermon_date: NaiveDate,
    pub series: Option<String>,
    pub category: Option<String>,
    pub description: String,
    pub video_type: Option<String>,
    pub video_file: Option<String>,
    pub audio_file: Option<String>,
    pub pdf_file: Option<String>,
    pub image_file: Option<String>,
    pub duration_minutes: Option<i32>,
    pub tags: Json<Vec<String>>,
    pub is_featured: bool,
    pub allow_downloads: bool,
    pub is_published: bool,
    pub enable_comments: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SermonScripture {
    pub id: Uuid,
    pub sermon_id: Uuid,
    pub reference: String,
    pub display_order: i32,
}

/// How the sermon video is provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoType {
    File,
    Url,
}

impl VideoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoType::File => "file",
            VideoType::Url => "url",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SermonMedia {
    pub video_file: Option<String>,
    pub audio_file: Option<String>,
    pub pdf_file: Option<String>,
    pub image_file: Option<String>,
}

impl SermonMedia {
    pub fn paths(&self) -> [Option<&str>; 4] {
        [
            self.video_file.as_deref(),
            self.audio_file.as_deref(),
            self.pdf_file.as_deref(),
            self.image_file.as_deref(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct SermonData {
    pub title: String,
    pub speaker: String,
    pub sermon_date: NaiveDate,
    pub series: Option<String>,
    pub category: Option<String>,
    pub description: String,
    pub video_type: Option<VideoType>,
    /// External video link, used when `video_type` is `Url`
    pub video_url: Option<String>,
    pub duration_minutes: Option<i32>,
    pub tags: Vec<String>,
    pub is_featured: bool,
    pub allow_downloads: bool,
    pub is_published: bool,
    pub enable_comments: bool,
    pub scriptures: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SermonFilter {
    pub view: Option<String>,
    pub category: Option<String>,
    pub series: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Media columns keep their value unless a replacement is bound. Switching an
/// external link to an uploaded video without a new file clears the link.
const UPDATE_SERMON: &str = r#"
    UPDATE sermons SET
        title = $2, speaker = $3, sermon_date = $4, series = $5, category = $6,
        description = $7,
        video_type = COALESCE($8, video_type),
        video_file = CASE
            WHEN $9::TEXT IS NOT NULL THEN $9
            WHEN $8 = 'file' AND video_type = 'url' THEN NULL
            ELSE video_file
        END,
        audio_file = COALESCE($10, audio_file),
        pdf_file = COALESCE($11, pdf_file),
        image_file = COALESCE($12, image_file),
        duration_minutes = $13, tags = $14, is_featured = $15,
        allow_downloads = $16, is_published = $17, enable_comments = $18,
        published_at = CASE
            WHEN $17 THEN COALESCE(published_at, NOW())
            ELSE NULL
        END,
        updated_at = NOW()
    WHERE id = $1
    RETURNING *
"#;

impl Sermon {
    pub fn media(&self) -> SermonMedia {
        // An external video link is not a stored file
        let video_file = match self.video_type.as_deref() {
            Some("url") => None,
            _ => self.video_file.clone(),
        };

        SermonMedia {
            video_file,
            audio_file: self.audio_file.clone(),
            pdf_file: self.pdf_file.clone(),
            image_file: self.image_file.clone(),
        }
    }

    fn video_column(data: &SermonData, media: &SermonMedia) -> Option<String> {
        match data.video_type {
            Some(VideoType::Url) => data.video_url.clone(),
            _ => media.video_file.clone(),
        }
    }

    pub async fn create(
        pool: &PgPool,
        data: SermonData,
        media: SermonMedia,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let sermon = sqlx::query_as::<_, Sermon>(
            r#"
            INSERT INTO sermons (
                title, speaker, sermon_date, series, category, description,
                video_type, video_file, audio_file, pdf_file, image_file,
                duration_minutes, tags, is_featured, allow_downloads, is_published,
                enable_comments, published_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                CASE WHEN $16 THEN NOW() ELSE NULL END
            )
            RETURNING *
            "#,
        )
        .bind(&data.title)
        .bind(&data.speaker)
        .bind(data.sermon_date)
        .bind(&data.series)
        .bind(&data.category)
        .bind(&data.description)
        .bind(data.video_type.map(|t| t.as_str()))
        .bind(Self::video_column(&data, &media))
        .bind(&media.audio_file)
        .bind(&media.pdf_file)
        .bind(&media.image_file)
        .bind(data.duration_minutes)
        .bind(Json(&data.tags))
        .bind(data.is_featured)
        .bind(data.allow_downloads)
        .bind(data.is_published)
        .bind(data.enable_comments)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_scriptures(&mut tx, sermon.id, &data.scriptures).await?;

        tx.commit().await?;

        Ok(sermon)
    }

    /// Updates a sermon. Uploaded media only replaces columns when a new file
    /// was given; scriptures are deleted and re-inserted.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: SermonData,
        media: SermonMedia,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let sermon = sqlx::query_as::<_, Sermon>(UPDATE_SERMON)
            .bind(id)
            .bind(&data.title)
            .bind(&data.speaker)
            .bind(data.sermon_date)
            .bind(&data.series)
            .bind(&data.category)
            .bind(&data.description)
            .bind(data.video_type.map(|t| t.as_str()))
            .bind(Self::video_column(&data, &media))
            .bind(&media.audio_file)
            .bind(&media.pdf_file)
            .bind(&media.image_file)
            .bind(data.duration_minutes)
            .bind(Json(&data.tags))
            .bind(data.is_featured)
            .bind(data.allow_downloads)
            .bind(data.is_published)
            .bind(data.enable_comments)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM sermon_scriptures WHERE sermon_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        Self::insert_scriptures(&mut tx, id, &data.scriptures).await?;

        tx.commit().await?;

        Ok(sermon)
    }

    async fn insert_scriptures(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        sermon_id: Uuid,
        scriptures: &[String],
    ) -> Result<(), sqlx::Error> {
        let references = scriptures.iter().map(|s| s.trim()).filter(|s| !s.is_empty());

        for (order, reference) in (1i32..).zip(references) {
            sqlx::query(
                "INSERT INTO sermon_scriptures (sermon_id, reference, display_order) VALUES ($1, $2, $3)",
            )
            .bind(sermon_id)
            .bind(reference)
            .bind(order)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Sermon>("SELECT * FROM sermons WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn scriptures(
        pool: &PgPool,
        sermon_id: Uuid,
    ) -> Result<Vec<SermonScripture>, sqlx::Error> {
        sqlx::query_as::<_, SermonScripture>(
            "SELECT * FROM sermon_scriptures WHERE sermon_id = $1 ORDER BY display_order",
        )
        .bind(sermon_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list(pool: &PgPool, filter: &SermonFilter) -> Result<Vec<Self>, sqlx::Error> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM sermons WHERE TRUE");

        let view = filter.view.as_deref().unwrap_or("all");
        match view {
            "featured" => {
                query.push(" AND is_featured");
            }
            "recent" => {
                query.push(" AND sermon_date >= CURRENT_DATE - INTERVAL '30 days'");
            }
            "published" => {
                query.push(" AND is_published");
            }
            "draft" => {
                query.push(" AND NOT is_published");
            }
            _ => {}
        }

        if let Some(category) = non_blank(&filter.category) {
            query.push(" AND category = ").push_bind(category.to_string());
        }
        if let Some(series) = non_blank(&filter.series) {
            query.push(" AND series = ").push_bind(series.to_string());
        }
        if let Some(search) = non_blank(&filter.search) {
            let pattern = format!("%{}%", search);
            query
                .push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR speaker ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        if view == "popular" {
            query.push(" ORDER BY view_count DESC, sermon_date DESC");
        } else {
            query.push(" ORDER BY sermon_date DESC, created_at DESC");
        }

        let limit = filter.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT);
        query.push(" LIMIT ").push_bind(limit);
        if let Some(offset) = filter.offset.filter(|o| *o > 0) {
            query.push(" OFFSET ").push_bind(offset);
        }

        query.build_query_as::<Sermon>().fetch_all(pool).await
    }

    /// Returns the new view count, or `None` if the sermon does not exist
    pub async fn increment_views(pool: &PgPool, id: Uuid) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE sermons SET view_count = view_count + 1 WHERE id = $1 RETURNING view_count",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sermons WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty() && *v != "all")
}
