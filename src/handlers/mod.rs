//! # HTTP Handlers
//!
//! Thin adapters between actix-web and the storage / retrieval components.
//! Handlers validate input, call one component operation and shape the JSON
//! response; business rules live in `storage`, `links` and `retrieval`.
//!
//! ## Route groups (all under `/api`):
//! - `/transcribe`: upload audio, run the transcriber, save the result
//! - `/text`: save and fetch plain text transcriptions
//! - `/live`: save live transcriptions with an optional audio recording
//! - `/qa`: question answering
//! - `/files`: listing, info, download and deletion of any artifact
//! - `/audio`, `/uploads`: range-aware byte serving

pub mod audio;
pub mod config;
pub mod files;
pub mod live;
pub mod qa;
pub mod text;
pub mod transcribe;
mod upload;

use crate::error::AppError;
use crate::health;
use crate::storage::FileBody;
use actix_web::body::SizedStream;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};

/// JSON request bodies larger than this are rejected.
const JSON_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Register every `/api` route on `cfg`.
///
/// `/files/batch` is registered before `/files/{filename}` so that the
/// literal segment wins.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(JSON_BODY_LIMIT)
            .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into()),
    )
    .route("/health", web::get().to(health::health_check))
    .route("/metrics", web::get().to(health::detailed_metrics))
    .route("/config", web::get().to(config::get_config))
    .service(
        web::scope("/transcribe")
            .route("", web::post().to(transcribe::transcribe_audio))
            .route("", web::get().to(transcribe::list_transcriptions))
            .route("/{filename}", web::get().to(transcribe::get_transcription)),
    )
    .service(
        web::scope("/text")
            .route("", web::post().to(text::save_text))
            .route("", web::get().to(text::list_texts))
            .route("/{filename}", web::get().to(text::get_text_file)),
    )
    .service(
        web::scope("/live")
            .route("", web::post().to(live::save_live_transcription))
            .route("", web::get().to(live::list_live_transcriptions))
            .route("/download/{kind}/{filename}", web::get().to(live::download_live_artifact)),
    )
    .service(
        web::scope("/qa")
            .route("", web::post().to(qa::ask_question))
            .route("/knowledge-base", web::get().to(qa::knowledge_base))
            .route("/context/{filename}", web::get().to(qa::transcription_context)),
    )
    .service(
        web::scope("/files")
            .route("", web::get().to(files::list_files))
            .route("/info/{filename}", web::get().to(files::file_info))
            .route("/download/{filename}", web::get().to(files::download_file))
            .route("/batch", web::delete().to(files::delete_files))
            .route("/{filename}", web::delete().to(files::delete_file)),
    )
    .service(
        web::scope("/audio")
            .route("/play/{filename}", web::get().to(audio::play))
            .route("/stream/{filename}", web::get().to(audio::play))
            .route("/download/{filename}", web::get().to(audio::download))
            .route("/info/{filename}", web::get().to(audio::info)),
    )
    .route("/uploads/{filename}", web::get().to(audio::serve_upload));
}

/// JSON 404 for unmatched routes.
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::not_found(format!(
        "Route not found: {} {}",
        req.method(),
        req.path()
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Inline,
    Attachment,
}

/// Value of the `Range` request header, if any.
pub(crate) fn range_header(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
}

/// Response builder for a file body: `206` with `Content-Range` for a
/// partial body, `200` otherwise.
pub(crate) fn file_response(
    body: &FileBody,
    content_type: &str,
    filename: &str,
    disposition: Disposition,
) -> HttpResponseBuilder {
    let mut builder = match body.range {
        Some(range) => {
            let mut builder = HttpResponse::PartialContent();
            builder.insert_header((header::CONTENT_RANGE, range.content_range(body.total)));
            builder
        }
        None => HttpResponse::Ok(),
    };

    let disposition = match disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };

    builder
        .insert_header((header::CONTENT_TYPE, content_type.to_string()))
        .insert_header((header::ACCEPT_RANGES, "bytes"))
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("{}; filename=\"{}\"", disposition, filename),
        ));
    builder
}

/// Finish `builder` with the file's byte stream and exact length.
pub(crate) fn stream_body(mut builder: HttpResponseBuilder, body: FileBody) -> HttpResponse {
    let length = body.content_length();
    builder.body(SizedStream::new(length, body.stream))
}

/// First `max_chars` characters, with `...` appended when truncated.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::AppConfig;
    use crate::error::{AppError, AppResult};
    use crate::state::AppState;
    use crate::transcription::{Transcriber, TranscriptionResult};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    /// Transcriber double with a fixed outcome.
    pub enum FakeTranscriber {
        Text(&'static str),
        TimesOut,
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, _audio: &Path, _timeout: Duration) -> AppResult<TranscriptionResult> {
            match self {
                FakeTranscriber::Text(text) => Ok(TranscriptionResult {
                    text: text.to_string(),
                    processing_time_ms: 1,
                }),
                FakeTranscriber::TimesOut => Err(AppError::Timeout(
                    "Transcription timeout. File might be too long.".to_string(),
                )),
            }
        }
    }

    /// State rooted in a temp directory.
    pub fn state_in(dir: &tempfile::TempDir, transcriber: FakeTranscriber) -> AppState {
        let mut config = AppConfig::default();
        config.storage.upload_dir = dir.path().join("uploads");
        config.storage.document_path = dir.path().join("transcriptions.json");
        AppState::with_transcriber(config, Arc::new(transcriber))
    }
}
