//! Multipart form reading shared by the transcribe and live routes.
//!
//! The file part is streamed straight into the upload directory under a
//! fresh unique name; text parts are collected into a map. If anything goes
//! wrong after the file has been created, the partial file is removed.

use crate::error::{AppError, AppResult};
use crate::storage::media;
use crate::storage::{FileStore, SafePath};
use actix_multipart::Multipart;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Text parts larger than this are rejected.
const TEXT_FIELD_LIMIT: usize = 10 * 1024 * 1024;

/// Which part carries the file and what it may contain.
pub struct UploadSpec {
    pub field: &'static str,
    pub allowed_mime: &'static [&'static str],
    pub max_bytes: usize,
}

/// A file part that has been written to the upload directory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file: SafePath,
    pub original_name: String,
    pub mime: String,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Read a whole multipart payload.
pub async fn read_form(
    mut payload: Multipart,
    files: &FileStore,
    spec: &UploadSpec,
) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();
    if let Err(e) = collect_parts(&mut payload, files, spec, &mut form).await {
        if let Some(upload) = form.file.take() {
            files.remove_quietly(&upload.file).await;
        }
        return Err(e);
    }
    Ok(form)
}

async fn collect_parts(
    payload: &mut Multipart,
    files: &FileStore,
    spec: &UploadSpec,
    form: &mut UploadForm,
) -> AppResult<()> {
    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::InvalidInput(format!("Multipart error: {}", e)))?;

        let disposition = field
            .content_disposition()
            .ok_or_else(|| AppError::InvalidInput("Missing content disposition".to_string()))?;
        let name = disposition
            .get_name()
            .ok_or_else(|| AppError::InvalidInput("Missing field name".to_string()))?
            .to_string();
        let original_name = disposition.get_filename().map(str::to_string);

        match original_name {
            Some(original_name) if name == spec.field => {
                if form.file.is_some() {
                    return Err(AppError::InvalidInput(format!(
                        "Only one '{}' file is allowed",
                        spec.field
                    )));
                }

                let mime = field
                    .content_type()
                    .map(|m| m.essence_str().to_string())
                    .unwrap_or_default();
                if !spec.allowed_mime.contains(&mime.as_str()) {
                    return Err(AppError::InvalidInput(format!(
                        "Invalid file type '{}'. Allowed: {}",
                        mime,
                        spec.allowed_mime.join(", ")
                    )));
                }

                let target = files.resolve(&files.unique_name(&media::extension_of(&original_name)))?;
                let mut handle = files.create(&target).await?;
                form.file = Some(UploadedFile {
                    file: target.clone(),
                    original_name,
                    mime,
                    size: 0,
                });

                let mut written: usize = 0;
                while let Some(chunk) = field.next().await {
                    let chunk = chunk
                        .map_err(|e| AppError::InvalidInput(format!("Chunk error: {}", e)))?;
                    written += chunk.len();
                    if written > spec.max_bytes {
                        return Err(AppError::InvalidInput(format!(
                            "File too large (max: {} bytes)",
                            spec.max_bytes
                        )));
                    }
                    handle.write_all(&chunk).await?;
                }
                handle.flush().await?;
                handle.sync_all().await?;

                if let Some(upload) = form.file.as_mut() {
                    upload.size = written as u64;
                }
                info!(filename = %target.name(), size = written, "Upload stored");
            }
            _ => {
                let mut bytes = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk
                        .map_err(|e| AppError::InvalidInput(format!("Chunk error: {}", e)))?;
                    if bytes.len() + chunk.len() > TEXT_FIELD_LIMIT {
                        return Err(AppError::InvalidInput(format!("Field '{}' is too large", name)));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                let value = String::from_utf8(bytes).map_err(|_| {
                    AppError::InvalidInput(format!("Field '{}' is not valid UTF-8", name))
                })?;
                debug!(field = %name, len = value.len(), "Form field read");
                form.fields.insert(name, value);
            }
        }
    }

    Ok(())
}
