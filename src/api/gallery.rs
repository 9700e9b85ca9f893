use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::api::forms::MultipartForm;
use crate::api::middleware::session::AppState;
use crate::error::{ActionResponse, AppError, Result};
use crate::models::gallery::{
    media_type_for, AlbumData, AlbumSummary, AlbumUpdate, GalleryAlbum, GalleryFilter,
    GalleryMedia, MediaItem,
};
use crate::services::storage::as_paths;

const UPLOAD_ENTITY: &str = "gallery";
const DEFAULT_ALBUM_STATUS: &str = "published";

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GalleryListing {
    Albums(Vec<AlbumSummary>),
    Media(Vec<MediaItem>),
}

#[derive(Debug, Serialize)]
pub struct AlbumUploadResult {
    pub album: GalleryAlbum,
    pub uploaded: usize,
    pub skipped: usize,
    pub removed: usize,
}

/// Paths touched while applying an upload
#[derive(Debug, Default)]
struct UploadFiles {
    /// Written during this request; removed again if the request fails
    written: Vec<String>,
    /// Superseded by this request; removed once it commits
    obsolete: Vec<String>,
}

async fn list_gallery(
    State(state): State<AppState>,
    Query(filter): Query<GalleryFilter>,
) -> Result<Json<ActionResponse<GalleryListing>>> {
    let listing = match filter.view.as_deref() {
        None | Some("albums") => GalleryListing::Albums(GalleryAlbum::list(&state.pool, &filter).await?),
        Some("all" | "photos" | "videos") => {
            GalleryListing::Media(GalleryMedia::list(&state.pool, &filter).await?)
        }
        Some(other) => {
            return Err(AppError::validation(format!("Unknown gallery view: {}", other)));
        }
    };

    Ok(ActionResponse::data(listing))
}

fn new_album_data(form: &MultipartForm) -> Result<AlbumData> {
    form.require(&["albumName", "eventDate", "category"])?;

    Ok(AlbumData {
        album_name: form.string("albumName").unwrap_or_default(),
        event_date: form
            .date("eventDate")?
            .ok_or_else(|| AppError::validation("Event date is required"))?,
        category: form.string("category").unwrap_or_default(),
        description: form.string("description"),
        tags: form.string("tags"),
        photographer: form.string("photographer"),
        status: form
            .string("status")
            .unwrap_or_else(|| DEFAULT_ALBUM_STATUS.to_string()),
    })
}

fn album_update(form: &MultipartForm) -> Result<AlbumUpdate> {
    Ok(AlbumUpdate {
        album_name: form.string("albumName"),
        event_date: form.date("eventDate")?,
        category: form.string("category"),
        description: form.string("description"),
        tags: form.string("tags"),
        photographer: form.string("photographer"),
        status: form.string("status"),
    })
}

/// Creates or updates the album and stores its media inside `tx`
async fn apply_upload(
    state: &AppState,
    tx: &mut Transaction<'_, Postgres>,
    form: &MultipartForm,
    files: &mut UploadFiles,
) -> Result<AlbumUploadResult> {
    let mut removed = 0;

    let album_id = match form.parse::<Uuid>("album_id")? {
        Some(album_id) => {
            GalleryAlbum::find_by_id(&mut **tx, album_id)
                .await?
                .ok_or_else(|| AppError::not_found("Album not found"))?;
            GalleryAlbum::update_metadata(&mut **tx, album_id, &album_update(form)?).await?;

            let deleted_ids = form
                .json::<Vec<Uuid>>("deleted_media_ids")?
                .unwrap_or_default();
            if !deleted_ids.is_empty() {
                let deleted = GalleryMedia::delete_many(&mut **tx, album_id, &deleted_ids).await?;
                removed = deleted.len();
                files.obsolete.extend(deleted.into_iter().map(|m| m.file_path));
            }

            album_id
        }
        None => GalleryAlbum::create(&mut **tx, &new_album_data(form)?).await?.id,
    };

    let mut uploaded = 0;
    let mut skipped = 0;
    for file in form.files("media") {
        let Some(media_type) = media_type_for(file.content_type.as_deref()) else {
            tracing::debug!(file = %file.file_name, "Skipping non-media upload");
            skipped += 1;
            continue;
        };

        let Some(path) = state.media.save(UPLOAD_ENTITY, file).await? else {
            continue;
        };
        files.written.push(path.clone());

        GalleryMedia::create(&mut **tx, album_id, media_type, &path, Some(&file.file_name)).await?;
        uploaded += 1;
    }

    if let Some(cover) = form.file("cover_image").filter(|f| f.is_image()) {
        if let Some(path) = state.media.save(UPLOAD_ENTITY, cover).await? {
            files.written.push(path.clone());
            if let Some(previous) = GalleryAlbum::set_cover(&mut **tx, album_id, &path).await? {
                files.obsolete.push(previous);
            }
        }
    }

    GalleryAlbum::recount(&mut **tx, album_id).await?;
    let album = GalleryAlbum::find_by_id(&mut **tx, album_id)
        .await?
        .ok_or_else(|| AppError::not_found("Album not found"))?;

    Ok(AlbumUploadResult {
        album,
        uploaded,
        skipped,
        removed,
    })
}

async fn upload_album(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ActionResponse<AlbumUploadResult>>> {
    let form = MultipartForm::from_multipart(multipart).await?;

    let mut files = UploadFiles::default();
    let mut tx = state.pool.begin().await?;

    let result = match apply_upload(&state, &mut tx, &form, &mut files).await {
        Ok(result) => result,
        Err(e) => {
            // Rolled back when `tx` drops
            state
                .media
                .delete_all(&as_paths(&files.written))
                .await;
            return Err(e);
        }
    };

    if let Err(e) = tx.commit().await {
        state
            .media
            .delete_all(&as_paths(&files.written))
            .await;
        return Err(e.into());
    }

    state
        .media
        .delete_all(&as_paths(&files.obsolete))
        .await;

    tracing::info!(
        album_id = %result.album.id,
        uploaded = result.uploaded,
        skipped = result.skipped,
        removed = result.removed,
        "Album media saved"
    );

    Ok(ActionResponse::with_message("Album saved successfully", result))
}

async fn delete_album(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse<()>>> {
    let album = GalleryAlbum::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Album not found"))?;

    let files: Vec<String> = GalleryMedia::for_album(&state.pool, id)
        .await?
        .into_iter()
        .map(|m| m.file_path)
        .collect();
    state.media.delete_all(&as_paths(&files)).await;
    state.media.delete(album.cover_image.as_deref()).await;

    GalleryAlbum::delete(&state.pool, id).await?;

    tracing::info!(album_id = %id, media = files.len(), "Album deleted");

    Ok(ActionResponse::message("Album deleted successfully"))
}

async fn delete_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse<()>>> {
    let media = GalleryMedia::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Media not found"))?;

    let mut tx = state.pool.begin().await?;
    GalleryMedia::delete(&mut *tx, id).await?;
    GalleryAlbum::recount(&mut *tx, media.album_id).await?;
    tx.commit().await?;

    state.media.delete(Some(&media.file_path)).await;

    tracing::info!(media_id = %id, album_id = %media.album_id, "Media deleted");

    Ok(ActionResponse::message("Media deleted successfully"))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/gallery", get(list_gallery))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/gallery/albums", post(upload_album))
        .route("/gallery/albums/:id", delete(delete_album))
        .route("/gallery/media/:id", delete(delete_media))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_album_requires_name_date_category() {
        let mut form = MultipartForm::default();
        form.insert_text("albumName", "Easter 2025");

        match new_album_data(&form) {
            Err(AppError::Validation(msg)) => {
                assert_eq!(msg, "Missing required fields: eventDate, category")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_new_album_defaults_to_published() {
        let mut form = MultipartForm::default();
        form.insert_text("albumName", "Easter 2025");
        form.insert_text("eventDate", "2025-04-20");
        form.insert_text("category", "worship");

        let data = new_album_data(&form).unwrap();
        assert_eq!(data.status, DEFAULT_ALBUM_STATUS);
        assert_eq!(data.description, None);
    }

    #[test]
    fn test_album_update_keeps_unset_fields() {
        let mut form = MultipartForm::default();
        form.insert_text("photographer", "Esi");

        let update = album_update(&form).unwrap();
        assert_eq!(update.photographer.as_deref(), Some("Esi"));
        assert_eq!(update.album_name, None);
        assert_eq!(update.event_date, None);
    }
}
