//! Plain text transcriptions: save, list, download.

use super::{file_response, preview, stream_body, Disposition};
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::media;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map};

const LIST_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTextRequest {
    #[serde(default)]
    pub text: String,
    pub file_name: Option<String>,
}

/// `transcription_<millis>.txt` unless a name is given; the name is
/// sanitized and always ends in `.txt`.
fn text_file_name(requested: Option<&str>) -> String {
    let raw = requested
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("transcription_{}.txt", Utc::now().timestamp_millis()));

    let mut name = media::sanitize_stem(&raw);
    if !name.to_lowercase().ends_with(".txt") {
        name.push_str(".txt");
    }
    name
}

/// Save text as a `.txt` artifact plus a single-file record.
///
/// ## Endpoint: `POST /api/text`
///
/// ## Request Body:
/// ```json
/// { "text": "Notes from standup", "fileName": "standup" }
/// ```
///
/// ## Response:
/// ```json
/// {
///   "success": true,
///   "fileName": "standup.txt",
///   "filePath": "/uploads/standup.txt",
///   "size": 18,
///   "savedAt": "2025-01-01T12:00:00+00:00"
/// }
/// ```
pub async fn save_text(
    state: web::Data<AppState>,
    request: web::Json<SaveTextRequest>,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    if request.text.trim().is_empty() {
        return Err(AppError::InvalidInput("No text provided or text is empty".to_string()));
    }

    let file = state.files.resolve(&text_file_name(request.file_name.as_deref()))?;
    state.files.write(&file, request.text.as_bytes()).await?;

    let record = match state
        .records
        .upsert_by_single_file(file.name(), &request.text, Map::new())
        .await
    {
        Ok(record) => record,
        Err(e) => {
            state.files.remove_quietly(&file).await;
            return Err(e);
        }
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "fileName": file.name(),
        "filePath": format!("/uploads/{}", file.name()),
        "size": record.data.size,
        "savedAt": record.data.saved_at
    })))
}

/// ## Endpoint: `GET /api/text`
pub async fn list_texts(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let records = state.records.list_all().await?;

    let texts: Vec<_> = records
        .iter()
        .map(|record| {
            let full = record.data.body().unwrap_or_default().to_string();
            json!({
                "filename": record.id,
                "text": preview(&full, LIST_PREVIEW_CHARS),
                "fullText": full,
                "savedAt": record.data.saved_at,
                "size": record.data.size,
                "filePath": record.data.extra.get("filePath")
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "count": texts.len(),
        "texts": texts
    })))
}

/// Download a text artifact as an attachment.
///
/// ## Endpoint: `GET /api/text/{filename}`
pub async fn get_text_file(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let file = state.files.resolve(&path.into_inner())?;
    let body = state.files.open_range(&file, None, None).await?;
    let builder = file_response(&body, "text/plain; charset=utf-8", file.name(), Disposition::Attachment);
    Ok(stream_body(builder, body))
}
