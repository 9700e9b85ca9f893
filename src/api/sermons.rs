use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::api::forms::{with_other, MultipartForm};
use crate::api::middleware::session::AppState;
use crate::error::{ActionResponse, AppError, Result};
use crate::models::sermon::{Sermon, SermonData, SermonFilter, SermonMedia, SermonScripture, VideoType};
use crate::services::storage::MediaStore;

const UPLOAD_ENTITY: &str = "sermons";

#[derive(Debug, Serialize)]
pub struct SermonDetail {
    #[serde(flatten)]
    pub sermon: Sermon,
    pub scriptures: Vec<SermonScripture>,
}

#[derive(Debug, Serialize)]
pub struct ViewCount {
    pub view_count: i64,
}

fn video_type(form: &MultipartForm) -> Option<VideoType> {
    match form.text("videoType") {
        Some("url") => Some(VideoType::Url),
        Some("file") => Some(VideoType::File),
        _ => None,
    }
}

/// A sermon needs a video (uploaded or linked) or an audio file
fn has_media_source(form: &MultipartForm) -> bool {
    let has_video = match video_type(form) {
        Some(VideoType::File) => form.file("videoFile").is_some(),
        Some(VideoType::Url) => form.text("videoUrl").is_some(),
        None => false,
    };

    has_video || form.file("audioFile").is_some()
}

fn sermon_data_from_form(form: &MultipartForm) -> Result<SermonData> {
    form.require(&["sermonTitle", "sermonSpeaker", "sermonDate", "sermonDescription"])?;

    let sermon_date = form
        .date("sermonDate")?
        .ok_or_else(|| AppError::validation("Sermon date is required"))?;

    let video_type = video_type(form);
    let video_url = match video_type {
        Some(VideoType::Url) => form.string("videoUrl"),
        _ => None,
    };

    Ok(SermonData {
        title: form.string("sermonTitle").unwrap_or_default(),
        speaker: form.string("sermonSpeaker").unwrap_or_default(),
        sermon_date,
        series: with_other(form.text("sermonSeries"), form.text("sermonSeriesOther")),
        category: with_other(form.text("sermonCategory"), form.text("sermonCategoryOther")),
        description: form.string("sermonDescription").unwrap_or_default(),
        video_type,
        video_url,
        duration_minutes: form
            .parse::<i32>("sermonDuration")
            .ok()
            .flatten()
            .filter(|d| *d > 0),
        // Unparseable tags are dropped rather than failing the upload
        tags: form.json::<Vec<String>>("tags").ok().flatten().unwrap_or_default(),
        is_featured: form.flag("featuredSermon"),
        allow_downloads: form.flag("allowDownloads"),
        is_published: form.flag("publishImmediately"),
        enable_comments: form.flag("enableComments"),
        scriptures: form.all("scripture").into_iter().map(str::to_string).collect(),
    })
}

async fn save_media(
    media: &MediaStore,
    form: &MultipartForm,
    video_type: Option<VideoType>,
) -> Result<SermonMedia> {
    let mut saved = SermonMedia::default();

    let uploads = [
        ("videoFile", video_type == Some(VideoType::File)),
        ("audioFile", true),
        ("pdfFile", true),
        ("sermonImage", true),
    ];

    for (index, (field, wanted)) in uploads.into_iter().enumerate() {
        let Some(file) = form.file(field).filter(|_| wanted) else {
            continue;
        };

        let path = match media.save(UPLOAD_ENTITY, file).await {
            Ok(path) => path,
            Err(e) => {
                media.delete_all(&saved.paths()).await;
                return Err(e.into());
            }
        };

        match index {
            0 => saved.video_file = path,
            1 => saved.audio_file = path,
            2 => saved.pdf_file = path,
            _ => saved.image_file = path,
        }
    }

    Ok(saved)
}

/// Stored files made obsolete by an update
fn obsolete_paths<'a>(
    old: &'a SermonMedia,
    new: &SermonMedia,
    video_type: Option<VideoType>,
) -> Vec<Option<&'a str>> {
    old.paths()
        .into_iter()
        .zip(new.paths())
        .enumerate()
        .filter(|(index, (_, new))| {
            new.is_some() || (*index == 0 && video_type == Some(VideoType::Url))
        })
        .map(|(_, (old, _))| old)
        .collect()
}

async fn list_sermons(
    State(state): State<AppState>,
    Query(filter): Query<SermonFilter>,
) -> Result<Json<ActionResponse<Vec<Sermon>>>> {
    let sermons = Sermon::list(&state.pool, &filter).await?;

    Ok(ActionResponse::data(sermons))
}

async fn get_sermon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse<SermonDetail>>> {
    let sermon = Sermon::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Sermon not found"))?;
    let scriptures = Sermon::scriptures(&state.pool, id).await?;

    Ok(ActionResponse::data(SermonDetail { sermon, scriptures }))
}

async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse<ViewCount>>> {
    let view_count = Sermon::increment_views(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Sermon not found"))?;

    Ok(ActionResponse::data(ViewCount { view_count }))
}

async fn create_sermon(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ActionResponse<Sermon>>)> {
    let form = MultipartForm::from_multipart(multipart).await?;
    let data = sermon_data_from_form(&form)?;

    if !has_media_source(&form) {
        return Err(AppError::validation(
            "At least one media source (Video or Audio) is required",
        ));
    }

    let media = save_media(&state.media, &form, data.video_type).await?;
    let sermon = match Sermon::create(&state.pool, data, media.clone()).await {
        Ok(sermon) => sermon,
        Err(e) => {
            state.media.delete_all(&media.paths()).await;
            return Err(e.into());
        }
    };

    tracing::info!(sermon_id = %sermon.id, title = %sermon.title, "Sermon created");

    Ok((
        StatusCode::CREATED,
        ActionResponse::with_message("Sermon created successfully", sermon),
    ))
}

async fn update_sermon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ActionResponse<Sermon>>> {
    let form = MultipartForm::from_multipart(multipart).await?;
    let data = sermon_data_from_form(&form)?;

    let existing = Sermon::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Sermon not found"))?;

    let video_type = data.video_type;
    let media = save_media(&state.media, &form, video_type).await?;
    let sermon = match Sermon::update(&state.pool, id, data, media.clone()).await {
        Ok(sermon) => sermon,
        Err(e) => {
            state.media.delete_all(&media.paths()).await;
            return Err(e.into());
        }
    };

    let old_media = existing.media();
    state
        .media
        .delete_all(&obsolete_paths(&old_media, &media, video_type))
        .await;

    tracing::info!(sermon_id = %id, "Sermon updated");

    Ok(ActionResponse::with_message("Sermon updated successfully", sermon))
}

async fn delete_sermon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse<()>>> {
    let sermon = Sermon::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Sermon not found"))?;

    state.media.delete_all(&sermon.media().paths()).await;
    Sermon::delete(&state.pool, id).await?;

    tracing::info!(sermon_id = %id, "Sermon deleted");

    Ok(ActionResponse::message("Sermon deleted successfully"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sermons", get(list_sermons))
        .route("/api/sermons/:id", get(get_sermon))
        .route("/api/sermons/:id/view", post(record_view))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/sermons", post(create_sermon))
        .route("/sermons/:id", put(update_sermon).delete(delete_sermon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::UploadedFile;

    fn audio() -> UploadedFile {
        UploadedFile {
            file_name: "message.mp3".to_string(),
            content_type: Some("audio/mpeg".to_string()),
            bytes: vec![0; 8],
        }
    }

    fn base_form() -> MultipartForm {
        let mut form = MultipartForm::default();
        form.insert_text("sermonTitle", "Walking in Faith");
        form.insert_text("sermonSpeaker", "Pastor Boateng");
        form.insert_text("sermonDate", "2025-01-12");
        form.insert_text("sermonDescription", "Hebrews 11 study.");
        form
    }

    #[test]
    fn test_media_source_required() {
        let mut form = base_form();
        assert!(!has_media_source(&form));

        form.insert_text("videoType", "url");
        assert!(!has_media_source(&form));

        form.insert_text("videoUrl", "https://youtu.be/xyz");
        assert!(has_media_source(&form));
    }

    #[test]
    fn test_audio_alone_is_enough() {
        let mut form = base_form();
        form.insert_file("audioFile", audio());

        assert!(has_media_source(&form));
    }

    #[test]
    fn test_form_mapping() {
        let mut form = base_form();
        form.insert_text("sermonSeries", "other");
        form.insert_text("sermonSeriesOther", "Heroes of Faith");
        form.insert_text("sermonCategory", "Teaching");
        form.insert_text("tags", "not json");
        form.insert_text("scripture[]", "Hebrews 11:1");
        form.insert_text("scripture[]", "Hebrews 11:6");
        form.insert_text("publishImmediately", "1");

        let data = sermon_data_from_form(&form).unwrap();

        assert_eq!(data.series.as_deref(), Some("Heroes of Faith"));
        assert_eq!(data.category.as_deref(), Some("Teaching"));
        assert!(data.tags.is_empty());
        assert_eq!(data.scriptures, vec!["Hebrews 11:1", "Hebrews 11:6"]);
        assert!(data.is_published);
        assert!(!data.enable_comments);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut form = MultipartForm::default();
        form.insert_text("sermonTitle", "Untitled");

        assert!(matches!(
            sermon_data_from_form(&form),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_switching_to_link_obsoletes_uploaded_video() {
        let old = SermonMedia {
            video_file: Some("/uploads/sermons/1-v.mp4".to_string()),
            audio_file: Some("/uploads/sermons/1-a.mp3".to_string()),
            ..Default::default()
        };
        let new = SermonMedia::default();

        assert_eq!(
            obsolete_paths(&old, &new, Some(VideoType::Url)),
            vec![Some("/uploads/sermons/1-v.mp4")]
        );
        assert!(obsolete_paths(&old, &new, Some(VideoType::File)).is_empty());
    }
}
