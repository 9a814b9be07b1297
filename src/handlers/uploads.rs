//! Multipart form parsing for the admin catalog endpoints.

use axum::extract::Multipart;
use std::{collections::HashMap, str::FromStr};

use crate::{errors::ServiceError, integrations::ImageUpload};

const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

/// Text fields and image files of one multipart request
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, Vec<String>>,
    files: Vec<ImageUpload>,
}

impl UploadForm {
    /// Reads every part, rejecting files over `max_file_bytes` or of a non-image type.
    pub async fn read(mut multipart: Multipart, max_file_bytes: usize) -> Result<Self, ServiceError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ServiceError::BadRequest(format!("Malformed form data: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().unwrap_or_default().to_string();
                    if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
                        return Err(ServiceError::BadRequest(
                            "Only JPEG, PNG and GIF images are allowed".into(),
                        ));
                    }
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ServiceError::BadRequest(format!("Upload failed: {}", e)))?;
                    if data.len() > max_file_bytes {
                        return Err(ServiceError::BadRequest(format!(
                            "{} exceeds the {} MB upload limit",
                            file_name,
                            max_file_bytes / (1024 * 1024)
                        )));
                    }
                    if data.is_empty() {
                        continue;
                    }
                    form.files.push(ImageUpload {
                        field: name,
                        file_name,
                        content_type,
                        data,
                    });
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ServiceError::BadRequest(format!("Malformed form data: {}", e)))?;
                    form.fields.entry(name).or_default().push(value);
                }
            }
        }
        Ok(form)
    }

    /// First non-empty value of a text field, parsed.
    pub fn opt<T: FromStr>(&self, name: &str) -> Result<Option<T>, ServiceError> {
        match self
            .fields
            .get(name)
            .and_then(|values| values.first())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| ServiceError::ValidationError(format!("Invalid value for {}", name))),
            None => Ok(None),
        }
    }

    pub fn required<T: FromStr>(&self, name: &str) -> Result<T, ServiceError> {
        self.opt(name)?
            .ok_or_else(|| ServiceError::ValidationError(format!("{} is required", name)))
    }

    /// Every value sent under `name`; comma-separated values are split.
    pub fn list(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .into_iter()
            .flatten()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Removes and returns the first file sent under `name`.
    pub fn take_file(&mut self, name: &str) -> Option<ImageUpload> {
        let index = self.files.iter().position(|f| f.field == name)?;
        Some(self.files.remove(index))
    }

    /// Removes and returns every file sent under `name`.
    pub fn take_files(&mut self, name: &str) -> Vec<ImageUpload> {
        let (taken, rest) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| f.field == name);
        self.files = rest;
        taken
    }
}
