//! # Upload-and-Transcribe Handlers
//!
//! ## Available Endpoints:
//! - `POST /api/transcribe` - multipart `file` upload, run the transcriber, save the record
//! - `GET /api/transcribe` - the whole transcription document
//! - `GET /api/transcribe/{filename}` - one entry, following aliases

use super::upload::{self, UploadSpec};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{error, info, warn};

const TRANSCRIBE_MIME: &[&str] = &["audio/mpeg", "audio/wav", "audio/mp4", "audio/m4a", "video/mp4"];

/// Upload an audio file and transcribe it.
///
/// ## Endpoint: `POST /api/transcribe`
///
/// ## Response:
/// ```json
/// {
///   "success": true,
///   "transcription": "Hello world",
///   "fileName": "1712345678901-3f2a9c1b.mp3",
///   "originalName": "meeting.mp3",
///   "processingTimeMs": 5230
/// }
/// ```
///
/// A transcriber timeout answers `408`; any failure removes the upload.
pub async fn transcribe_audio(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let spec = UploadSpec {
        field: "file",
        allowed_mime: TRANSCRIBE_MIME,
        max_bytes: state.config.storage.max_upload_bytes,
    };
    let form = upload::read_form(payload, &state.files, &spec).await?;
    let upload = form
        .file
        .ok_or_else(|| AppError::InvalidInput("No file uploaded".to_string()))?;

    info!(
        filename = %upload.file.name(),
        original = %upload.original_name,
        mime = %upload.mime,
        size = upload.size,
        "Starting transcription"
    );

    let outcome: AppResult<_> = async {
        let result = state
            .transcriber
            .transcribe(upload.file.path(), state.config.transcription.timeout())
            .await;
        state.record_transcription(result.is_ok());
        let result = result?;

        state
            .records
            .upsert_transcription(upload.file.name(), &result.text, &upload.original_name, upload.size)
            .await?;
        Ok(result)
    }
    .await;

    match outcome {
        Ok(result) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "transcription": result.text,
            "fileName": upload.file.name(),
            "originalName": upload.original_name,
            "processingTimeMs": result.processing_time_ms
        }))),
        Err(e) => {
            match &e {
                AppError::Timeout(_) => warn!(filename = %upload.file.name(), "Transcription timed out"),
                other => error!(filename = %upload.file.name(), error = %other, "Transcription failed"),
            }
            state.files.remove_quietly(&upload.file).await;
            Err(e)
        }
    }
}

/// ## Endpoint: `GET /api/transcribe`
pub async fn list_transcriptions(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let document = state.records.read().await?;
    Ok(HttpResponse::Ok().json(json!({ "transcriptions": document })))
}

/// ## Endpoint: `GET /api/transcribe/{filename}`
pub async fn get_transcription(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let filename = path.into_inner();
    let record = state
        .records
        .get(&filename)
        .await?
        .ok_or_else(|| AppError::not_found("Transcription not found"))?;

    Ok(HttpResponse::Ok().json(json!({
        "filename": filename,
        "transcription": record
    })))
}

#[cfg(test)]
mod tests {
    use crate::handlers::configure;
    use crate::handlers::test_support::{state_in, FakeTranscriber};
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use serde_json::Value;

    const BOUNDARY: &str = "vaultboundary";

    fn multipart_audio(filename: &str, mime: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: {m}\r\n\r\n",
                b = BOUNDARY,
                f = filename,
                m = mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/transcribe")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    fn uploads(dir: &tempfile::TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path().join("uploads"))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[actix_web::test]
    async fn test_transcribe_saves_record() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, FakeTranscriber::Text("hello from the meeting"));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .service(web::scope("/api").configure(configure)),
        )
        .await;

        let req = upload_request(multipart_audio("meeting.mp3", "audio/mpeg", b"ID3fakeaudio")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["transcription"], "hello from the meeting");
        assert_eq!(body["originalName"], "meeting.mp3");

        let saved = body["fileName"].as_str().unwrap().to_string();
        assert!(saved.ends_with(".mp3"));
        assert_eq!(uploads(&dir), vec![saved.clone()]);

        let req = test::TestRequest::get()
            .uri(&format!("/api/transcribe/{}", saved))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["transcription"]["text"], "hello from the meeting");
        assert_eq!(body["transcription"]["originalName"], "meeting.mp3");
        assert_eq!(state.get_metrics_snapshot().transcriptions_completed, 1);
    }

    #[actix_web::test]
    async fn test_timeout_is_408_and_removes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, FakeTranscriber::TimesOut);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .service(web::scope("/api").configure(configure)),
        )
        .await;

        let req = upload_request(multipart_audio("long.wav", "audio/wav", b"RIFFfake")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "transcription_timeout");

        assert!(uploads(&dir).is_empty());
        assert!(state.records.read().await.unwrap().is_empty());
        assert_eq!(state.get_metrics_snapshot().transcriptions_failed, 1);
    }

    #[actix_web::test]
    async fn test_rejects_disallowed_type() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, FakeTranscriber::Text("unused"));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(web::scope("/api").configure(configure)),
        )
        .await;

        let req = upload_request(multipart_audio("notes.txt", "text/plain", b"plain")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(uploads(&dir).is_empty());
    }

    #[actix_web::test]
    async fn test_unknown_transcription_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, FakeTranscriber::Text("unused"));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(web::scope("/api").configure(configure)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/transcribe/nope.mp3").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
