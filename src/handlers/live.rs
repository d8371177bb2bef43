//! # Live Transcription Handlers
//!
//! A live transcription is text captured in the browser, optionally with the
//! audio recording it came from. Saving one writes `<name>.txt`, keeps the
//! uploaded audio (if any) and records both under a single `live_<millis>`
//! entry with aliases for each artifact.
//!
//! ## Available Endpoints:
//! - `POST /api/live` - multipart `text`, `fileName`, `hasAudio`, `fileExtension`, `audio`
//! - `GET /api/live` - live records, newest first
//! - `GET /api/live/download/{type}/{filename}` - `type` is `text` or `audio`

use super::upload::{self, UploadSpec, UploadedFile};
use super::{file_response, stream_body, Disposition};
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::{media, LiveEntry, Record, LIVE_TRANSCRIPTION};
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::cmp::Reverse;
use tracing::{debug, info};

const LIVE_AUDIO_MIME: &[&str] = &[
    "audio/webm",
    "audio/mp4",
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "audio/x-wav",
    "video/webm",
    "video/mp4",
];

const LIVE_AUDIO_MAX_BYTES: usize = 50 * 1024 * 1024;

async fn discard(state: &AppState, audio: &Option<UploadedFile>) {
    if let Some(upload) = audio {
        state.files.remove_quietly(&upload.file).await;
    }
}

fn live_text_file_name(requested: Option<&str>) -> String {
    let base = requested
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("live_transcription_{}", Utc::now().timestamp_millis()));
    format!("{}.txt", media::sanitize_stem(&base))
}

/// Save a live transcription.
///
/// ## Endpoint: `POST /api/live`
///
/// ## Response:
/// ```json
/// {
///   "success": true,
///   "id": "live_1712345678901",
///   "textFile": "standup.txt",
///   "audioFile": "1712345678000-9b1c2d3e.webm",
///   "hasAudio": true,
///   "fileType": "webm",
///   "timestamp": "2025-01-01T12:00:00+00:00",
///   "downloadLinks": {
///     "text": "/api/live/download/text/standup.txt",
///     "audio": "/api/live/download/audio/1712345678000-9b1c2d3e.webm"
///   }
/// }
/// ```
///
/// The audio part is kept only when `hasAudio` is `"true"`. Every artifact
/// written by this request is removed again if the record cannot be saved.
pub async fn save_live_transcription(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let spec = UploadSpec {
        field: "audio",
        allowed_mime: LIVE_AUDIO_MIME,
        max_bytes: LIVE_AUDIO_MAX_BYTES.min(state.config.storage.max_upload_bytes),
    };
    let mut form = upload::read_form(payload, &state.files, &spec).await?;

    let text = form.field("text").unwrap_or_default().to_string();
    let wants_audio = form.field("hasAudio") == Some("true");
    let file_extension = form
        .field("fileExtension")
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .map(str::to_string);

    debug!(
        text_len = text.len(),
        file_name = ?form.field("fileName"),
        has_audio = wants_audio,
        audio = ?form.file.as_ref().map(|f| f.original_name.as_str()),
        "Received live transcription"
    );

    let audio = match form.file.take() {
        Some(upload) if wants_audio => Some(upload),
        Some(upload) => {
            state.files.remove_quietly(&upload.file).await;
            None
        }
        None => None,
    };

    if text.trim().is_empty() {
        discard(&state, &audio).await;
        return Err(AppError::InvalidInput("No text provided or text is empty".to_string()));
    }

    let mut text_file = match state.files.resolve(&live_text_file_name(form.field("fileName"))) {
        Ok(file) => file,
        Err(e) => {
            discard(&state, &audio).await;
            return Err(e);
        }
    };
    if state.files.exists(&text_file).await {
        let requested = text_file.name().to_string();
        text_file = match state.files.resolve(&state.files.unique_name("txt")) {
            Ok(file) => file,
            Err(e) => {
                discard(&state, &audio).await;
                return Err(e);
            }
        };
        info!(requested = %requested, saved_as = %text_file.name(), "Live text name taken, saving under a fresh name");
    }
    if let Err(e) = state.files.write(&text_file, text.as_bytes()).await {
        discard(&state, &audio).await;
        return Err(e);
    }

    let entry = LiveEntry {
        text,
        text_file: text_file.name().to_string(),
        audio_file: audio.as_ref().map(|a| a.file.name().to_string()),
        file_type: file_extension.or_else(|| audio.as_ref().map(|a| a.mime.clone())),
        audio_details: audio.as_ref().map(|a| {
            json!({
                "originalName": a.original_name,
                "savedName": a.file.name(),
                "size": a.size,
                "mimetype": a.mime
            })
        }),
    };

    let record = match state.records.upsert_live_entry(entry).await {
        Ok(record) => record,
        Err(e) => {
            state.files.remove_quietly(&text_file).await;
            discard(&state, &audio).await;
            return Err(e);
        }
    };

    info!(id = %record.id, text_file = %text_file.name(), has_audio = audio.is_some(), "Live transcription stored");

    let audio_file = record.data.audio_file.clone();
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "id": record.id,
        "textFile": text_file.name(),
        "audioFile": audio_file,
        "hasAudio": audio_file.is_some(),
        "fileType": record.data.extra.get("fileType"),
        "timestamp": Utc::now().to_rfc3339(),
        "downloadLinks": {
            "text": format!("/api/live/download/text/{}", text_file.name()),
            "audio": audio_file.as_ref().map(|name| format!("/api/live/download/audio/{}", name))
        }
    })))
}

/// ## Endpoint: `GET /api/live`
pub async fn list_live_transcriptions(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let records = state.records.list_all().await?;

    let mut live: Vec<Record> = records
        .matching(|data| data.is_kind(LIVE_TRANSCRIPTION))
        .collect();
    live.sort_by_key(|record| {
        Reverse(
            record
                .data
                .saved_at
                .as_deref()
                .and_then(|at| DateTime::parse_from_rfc3339(at).ok()),
        )
    });

    Ok(HttpResponse::Ok().json(json!({
        "count": live.len(),
        "transcriptions": live
    })))
}

/// ## Endpoint: `GET /api/live/download/{type}/{filename}`
pub async fn download_live_artifact(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (kind, filename) = path.into_inner();
    let content_type = match kind.as_str() {
        "text" => "text/plain; charset=utf-8",
        "audio" => media::mime_type(&filename),
        _ => return Err(AppError::InvalidInput("Invalid download type".to_string())),
    };

    let file = state.files.resolve(&filename)?;
    let body = state.files.open_range(&file, None, None).await?;
    let builder = file_response(&body, content_type, file.name(), Disposition::Attachment);
    Ok(stream_body(builder, body))
}
