//! # Audio Serving Handlers
//!
//! Range-aware byte serving for recordings. Browsers seek in `<audio>`
//! elements by issuing `Range: bytes=N-` requests, so every route here
//! answers `206 Partial Content` for a satisfiable range and `416` with
//! `Content-Range: bytes */<size>` otherwise.
//!
//! ## Available Endpoints:
//! - `GET /api/audio/play/{filename}` - inline playback, `?download=true` for an attachment
//! - `GET /api/audio/stream/{filename}` - same as `play`
//! - `GET /api/audio/download/{filename}` - always an attachment
//! - `GET /api/audio/info/{filename}` - size, type and transcription preview
//! - `GET /api/uploads/{filename}` - any upload, inline

use super::{file_response, preview, range_header, stream_body, Disposition};
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::media;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const CACHE_CONTROL: &str = "public, max-age=3600";
const INFO_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct PlayQuery {
    pub download: Option<String>,
}

/// IMF-fixdate, as used by `Last-Modified`.
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `true` if the client's copy (per `If-Modified-Since`) is still current.
/// HTTP dates have one-second resolution.
fn not_modified(req: &HttpRequest, modified_at: DateTime<Utc>) -> bool {
    req.headers()
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
        .map(|since| modified_at.timestamp() <= since.timestamp())
        .unwrap_or(false)
}

async fn serve_audio(
    req: &HttpRequest,
    state: &AppState,
    raw_name: &str,
    disposition: Disposition,
) -> Result<HttpResponse, AppError> {
    let file = state.files.resolve(raw_name)?;
    let stat = state.files.stat(&file).await?;
    let last_modified = http_date(stat.modified_at);

    if not_modified(req, stat.modified_at) {
        debug!(filename = %file.name(), "Audio not modified");
        return Ok(HttpResponse::NotModified()
            .insert_header((header::CACHE_CONTROL, CACHE_CONTROL))
            .insert_header((header::LAST_MODIFIED, last_modified))
            .finish());
    }

    let body = state.files.open_with_header(&file, range_header(req)).await?;
    debug!(
        filename = %file.name(),
        size = stat.size,
        formatted = %media::format_size(stat.size),
        partial = body.range.is_some(),
        "Serving audio"
    );

    let mut builder = file_response(&body, media::mime_type(file.name()), file.name(), disposition);
    builder
        .insert_header((header::CACHE_CONTROL, CACHE_CONTROL))
        .insert_header((header::LAST_MODIFIED, last_modified));
    Ok(stream_body(builder, body))
}

/// ## Endpoint: `GET /api/audio/play/{filename}` (also `/api/audio/stream/{filename}`)
pub async fn play(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PlayQuery>,
) -> Result<HttpResponse, AppError> {
    let disposition = match query.download.as_deref() {
        Some("true") => Disposition::Attachment,
        _ => Disposition::Inline,
    };
    serve_audio(&req, &state, &path.into_inner(), disposition).await
}

/// ## Endpoint: `GET /api/audio/download/{filename}`
pub async fn download(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    serve_audio(&req, &state, &path.into_inner(), Disposition::Attachment).await
}

/// Audio metadata plus a preview of the linked transcription.
///
/// ## Endpoint: `GET /api/audio/info/{filename}`
///
/// ## Response:
/// ```json
/// {
///   "success": true,
///   "file": {
///     "name": "1712345678000-9b1c2d3e.webm",
///     "size": 48213,
///     "formattedSize": "47.08 KB",
///     "type": "audio/webm",
///     "hasTranscription": true,
///     "transcriptionPreview": "sprint retro notes",
///     "playUrl": "/api/audio/play/1712345678000-9b1c2d3e.webm"
///   }
/// }
/// ```
pub async fn info(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let file = state.files.resolve(&path.into_inner())?;
    let stat = state.files.stat(&file).await?;
    let document = state.records.read().await?;

    let transcription = document
        .lookup(file.name())
        .and_then(|found| found.record.data.body().map(str::to_string));
    let name = file.name();

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "file": {
            "name": name,
            "size": stat.size,
            "formattedSize": media::format_size(stat.size),
            "type": media::mime_type(name),
            "extension": media::extension_of(name),
            "created": stat.created_at.map(|at| at.to_rfc3339()),
            "modified": stat.modified_at.to_rfc3339(),
            "duration": null,
            "hasTranscription": transcription.is_some(),
            "transcriptionPreview": transcription.as_deref().map(|text| preview(text, INFO_PREVIEW_CHARS)),
            "playUrl": format!("/api/audio/play/{}", name),
            "downloadUrl": format!("/api/audio/download/{}", name),
            "streamUrl": format!("/api/audio/stream/{}", name)
        }
    })))
}

/// ## Endpoint: `GET /api/uploads/{filename}`
pub async fn serve_upload(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let file = state.files.resolve(&path.into_inner())?;
    let body = state.files.open_with_header(&file, range_header(&req)).await?;
    let builder = file_response(&body, media::mime_type(file.name()), file.name(), Disposition::Inline);
    Ok(stream_body(builder, body))
}
