use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::Multipart;
use chrono::{NaiveDate, NaiveTime};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::services::storage::UploadedFile;

/// A parsed multipart submission: text fields and file parts by name.
///
/// Repeated fields keep every value in order. A trailing `[]` on the field
/// name is ignored, so `scripture[]` and `scripture` are the same field.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<UploadedFile>>,
}

fn field_key(name: &str) -> String {
    name.trim_end_matches("[]").to_string()
}

impl MultipartForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::validation(format!("Invalid form data: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::validation(format!("Invalid upload: {}", e)))?;

                    form.insert_file(
                        &name,
                        UploadedFile {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        },
                    );
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| AppError::validation(format!("Invalid form data: {}", e)))?;
                    form.insert_text(&name, value);
                }
            }
        }

        Ok(form)
    }

    pub fn insert_text(&mut self, name: &str, value: impl Into<String>) {
        self.fields.entry(field_key(name)).or_default().push(value.into());
    }

    pub fn insert_file(&mut self, name: &str, file: UploadedFile) {
        self.files.entry(field_key(name)).or_default().push(file);
    }

    /// First value of a field, trimmed; blank values count as absent
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn string(&self, name: &str) -> Option<String> {
        self.text(name).map(str::to_string)
    }

    /// Every non-blank value of a repeated field
    pub fn all(&self, name: &str) -> Vec<&str> {
        self.fields
            .get(name)
            .map(|values| {
                values
                    .iter()
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Checkbox-style flag
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.text(name), Some("true" | "on" | "1" | "yes"))
    }

    /// Fails with one message naming every missing field
    pub fn require(&self, names: &[&str]) -> Result<(), AppError> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| self.text(name).is_none())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, AppError> {
        self.text(name)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| AppError::validation(format!("Invalid value for {}", name)))
            })
            .transpose()
    }

    pub fn date(&self, name: &str) -> Result<Option<NaiveDate>, AppError> {
        self.text(name)
            .map(|v| {
                NaiveDate::parse_from_str(v, "%Y-%m-%d")
                    .map_err(|_| AppError::validation(format!("Invalid date for {}", name)))
            })
            .transpose()
    }

    pub fn time(&self, name: &str) -> Result<Option<NaiveTime>, AppError> {
        self.text(name)
            .map(|v| {
                NaiveTime::parse_from_str(v, "%H:%M")
                    .or_else(|_| NaiveTime::parse_from_str(v, "%H:%M:%S"))
                    .map_err(|_| AppError::validation(format!("Invalid time for {}", name)))
            })
            .transpose()
    }

    /// A JSON-encoded field, e.g. a tag array sent as one form value
    pub fn json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AppError> {
        self.text(name)
            .map(|v| {
                serde_json::from_str(v)
                    .map_err(|_| AppError::validation(format!("Invalid JSON in {}", name)))
            })
            .transpose()
    }

    /// First non-empty file of a field
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files(name).next()
    }

    pub fn files(&self, name: &str) -> impl Iterator<Item = &UploadedFile> {
        self.files
            .get(name)
            .into_iter()
            .flatten()
            .filter(|f| !f.is_empty())
    }
}

/// Resolves a select with an "Other" option to the free-text value
pub fn with_other(selected: Option<&str>, other: Option<&str>) -> Option<String> {
    match selected {
        Some(value) if value.eq_ignore_ascii_case("other") => other.map(str::to_string),
        Some(value) => Some(value.to_string()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> MultipartForm {
        let mut form = MultipartForm::default();
        form.insert_text("title", "  Sunday Sermon ");
        form.insert_text("speaker", "");
        form.insert_text("scripture[]", "John 3:16");
        form.insert_text("scripture[]", " ");
        form.insert_text("scripture[]", "Romans 8:28");
        form.insert_text("isFeatured", "on");
        form.insert_text("date", "2025-02-09");
        form.insert_text("startTime", "09:30");
        form.insert_text("tags", r#"["faith","hope"]"#);
        form.insert_text("maxCapacity", "abc");
        form.insert_file(
            "image",
            UploadedFile {
                file_name: "undefined".to_string(),
                content_type: None,
                bytes: Vec::new(),
            },
        );
        form.insert_file(
            "image",
            UploadedFile {
                file_name: "cover.png".to_string(),
                content_type: Some("image/png".to_string()),
                bytes: vec![1, 2, 3],
            },
        );
        form
    }

    #[test]
    fn test_text_is_trimmed_and_blank_is_absent() {
        let form = form();

        assert_eq!(form.text("title"), Some("Sunday Sermon"));
        assert_eq!(form.text("speaker"), None);
        assert_eq!(form.text("missing"), None);
    }

    #[test]
    fn test_repeated_fields_drop_brackets_and_blanks() {
        assert_eq!(form().all("scripture"), vec!["John 3:16", "Romans 8:28"]);
    }

    #[test]
    fn test_require_lists_every_missing_field() {
        let err = form().require(&["title", "speaker", "description"]).unwrap_err();

        match err {
            AppError::Validation(msg) => {
                assert_eq!(msg, "Missing required fields: speaker, description")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_typed_fields() {
        let form = form();

        assert!(form.flag("isFeatured"));
        assert!(!form.flag("allowDownloads"));
        assert_eq!(form.date("date").unwrap(), NaiveDate::from_ymd_opt(2025, 2, 9));
        assert_eq!(form.time("startTime").unwrap(), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(
            form.json::<Vec<String>>("tags").unwrap(),
            Some(vec!["faith".to_string(), "hope".to_string()])
        );
        assert!(form.parse::<i32>("maxCapacity").is_err());
        assert_eq!(form.parse::<i32>("volunteersNeeded").unwrap(), None);
    }

    #[test]
    fn test_empty_file_parts_are_skipped() {
        let form = form();

        assert_eq!(form.file("image").map(|f| f.file_name.as_str()), Some("cover.png"));
        assert_eq!(form.files("image").count(), 1);
        assert!(form.file("video").is_none());
    }

    #[test]
    fn test_other_option() {
        assert_eq!(with_other(Some("other"), Some("Revival")), Some("Revival".to_string()));
        assert_eq!(with_other(Some("Faith"), Some("ignored")), Some("Faith".to_string()));
        assert_eq!(with_other(Some("Other"), None), None);
        assert_eq!(with_other(None, Some("x")), None);
    }
}
