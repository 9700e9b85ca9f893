use std::io;
use std::path::{Component, Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// URL prefix under which the upload directory is served.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// A file received in a multipart submission.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Browsers send an empty part when a file input is left blank.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() || self.file_name.is_empty() || self.file_name == "undefined"
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|t| t.starts_with("image/"))
    }
}

/// Local media storage rooted at the public upload directory.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes an upload to `<root>/<entity>/<timestamp>-<name>` and returns its
    /// public path. Empty uploads are skipped.
    pub async fn save(&self, entity: &str, file: &UploadedFile) -> io::Result<Option<String>> {
        if file.is_empty() {
            return Ok(None);
        }

        let dir = self.root.join(entity);
        fs::create_dir_all(&dir).await?;

        let sanitized = sanitize_file_name(&file.file_name);
        let mut timestamp = Utc::now().timestamp_millis();

        loop {
            let stored_name = format!("{}-{}", timestamp, sanitized);
            let path = dir.join(&stored_name);

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut handle) => {
                    handle.write_all(&file.bytes).await?;
                    handle.flush().await?;

                    let public_path = format!("{}/{}/{}", PUBLIC_PREFIX, entity, stored_name);
                    tracing::debug!(path = %public_path, bytes = file.bytes.len(), "Upload stored");
                    return Ok(Some(public_path));
                }
                // Same name uploaded within the same millisecond
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => timestamp += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Removes a previously stored upload. Failures are logged and swallowed;
    /// the database change that triggered the delete still stands.
    pub async fn delete(&self, public_path: Option<&str>) {
        let Some(public_path) = public_path else {
            return;
        };

        let Some(path) = self.resolve(public_path) else {
            tracing::warn!(path = %public_path, "Refusing to delete path outside upload directory");
            return;
        };

        if let Err(e) = fs::remove_file(&path).await {
            tracing::warn!(path = %public_path, error = %e, "Failed to delete uploaded file");
        }
    }

    pub async fn delete_all(&self, public_paths: &[Option<&str>]) {
        for path in public_paths {
            self.delete(*path).await;
        }
    }

    /// Maps `/uploads/...` back to a file under the root. External URLs and
    /// paths that would escape the root yield `None`.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let relative = public_path
            .strip_prefix(PUBLIC_PREFIX)?
            .trim_start_matches('/');

        let relative = Path::new(relative);
        if relative.as_os_str().is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }

        Some(self.root.join(relative))
    }
}

/// Borrows owned upload paths in the shape [`MediaStore::delete_all`] takes.
pub fn as_paths(paths: &[String]) -> Vec<Option<&str>> {
    paths.iter().map(|p| Some(p.as_str())).collect()
}

/// Decodes a `data:<mime>;base64,<payload>` URL into an upload named
/// `<file_stem>.<subtype>`. Anything else yields `None`.
pub fn decode_data_url(data_url: &str, file_stem: &str) -> Option<UploadedFile> {
    let (header, payload) = data_url.strip_prefix("data:")?.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let (_, subtype) = mime.split_once('/')?;
    if subtype.is_empty() {
        return None;
    }

    let bytes = STANDARD.decode(payload.trim()).ok()?;

    Some(UploadedFile {
        file_name: format!("{}.{}", file_stem, subtype),
        content_type: Some(mime.to_string()),
        bytes,
    })
}

/// Replaces every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    // Some browsers send the full client path
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> MediaStore {
        MediaStore::new(std::env::temp_dir().join(format!("chapel-uploads-{}", Uuid::new_v4())))
    }

    fn upload(name: &str, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: Some("image/png".to_string()),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Easter Service (1).jpg"), "Easter_Service__1_.jpg");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\flyer.png"), "flyer.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("choir-2024.mp4"), "choir-2024.mp4");
    }

    #[test]
    fn test_resolve_rejects_traversal_and_external_urls() {
        let store = MediaStore::new("/srv/uploads");

        assert_eq!(
            store.resolve("/uploads/events/1-a.png"),
            Some(PathBuf::from("/srv/uploads/events/1-a.png"))
        );
        assert_eq!(store.resolve("/uploads/../secret"), None);
        assert_eq!(store.resolve("https://cdn.example.com/a.png"), None);
        assert_eq!(store.resolve("/uploads/"), None);
    }

    #[tokio::test]
    async fn test_save_and_delete_roundtrip() {
        let store = temp_store();
        let file = upload("Sunday flyer.png", b"png-bytes");

        let public_path = store.save("events", &file).await.unwrap().unwrap();
        assert!(public_path.starts_with("/uploads/events/"));
        assert!(public_path.ends_with("-Sunday_flyer.png"));

        let disk_path = store.resolve(&public_path).unwrap();
        assert_eq!(fs::read(&disk_path).await.unwrap(), b"png-bytes");

        store.delete(Some(&public_path)).await;
        assert!(fs::metadata(&disk_path).await.is_err());

        let _ = fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn test_same_name_twice_gets_distinct_paths() {
        let store = temp_store();
        let file = upload("photo.jpg", b"1");

        let first = store.save("gallery", &file).await.unwrap().unwrap();
        let second = store.save("gallery", &file).await.unwrap().unwrap();
        assert_ne!(first, second);

        let _ = fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn test_empty_upload_is_skipped() {
        let store = temp_store();
        let file = upload("", b"");

        assert_eq!(store.save("sermons", &file).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_deleting_missing_file_is_not_fatal() {
        let store = temp_store();
        store.delete(Some("/uploads/events/does-not-exist.png")).await;
        store.delete(None).await;
    }

    #[test]
    fn test_decode_data_url() {
        let file = decode_data_url("data:image/png;base64,cG5nLWJ5dGVz", "ama").unwrap();
        assert_eq!(file.file_name, "ama.png");
        assert_eq!(file.bytes, b"png-bytes");
        assert!(file.is_image());

        let text = decode_data_url("data:text/plain;base64,aGk=", "ama").unwrap();
        assert!(!text.is_image());

        assert!(decode_data_url("data:image/png,raw", "ama").is_none());
        assert!(decode_data_url("data:image/png;base64,***", "ama").is_none());
        assert!(decode_data_url("/uploads/members/a.png", "ama").is_none());
    }

    #[test]
    fn test_as_paths_borrows_every_entry() {
        let owned = vec!["/uploads/a.png".to_string(), "/uploads/b.png".to_string()];
        assert_eq!(
            as_paths(&owned),
            vec![Some("/uploads/a.png"), Some("/uploads/b.png")]
        );
    }

    #[tokio::test]
    async fn test_delete_all_removes_each_file() {
        let store = temp_store();
        let first = store.save("gallery", &upload("a.png", b"a")).await.unwrap().unwrap();
        let second = store.save("gallery", &upload("b.png", b"b")).await.unwrap().unwrap();

        store
            .delete_all(&[Some(first.as_str()), None, Some(second.as_str())])
            .await;

        assert!(fs::metadata(store.resolve(&first).unwrap()).await.is_err());
        assert!(fs::metadata(store.resolve(&second).unwrap()).await.is_err());

        let _ = fs::remove_dir_all(store.root()).await;
    }
}
