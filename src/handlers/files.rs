//! # Upload Directory Handlers
//!
//! Every artifact in the upload directory, joined with whatever the
//! transcription document knows about it.
//!
//! ## Available Endpoints:
//! - `GET /api/files` - listing with metadata and a summary
//! - `GET /api/files/info/{filename}` - one file in more detail
//! - `GET /api/files/download/{filename}` - attachment download
//! - `DELETE /api/files/{filename}` - delete one artifact and repair links
//! - `DELETE /api/files/batch` - delete several artifacts

use super::{file_response, preview, range_header, stream_body, Disposition};
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::media::{self, FileKind};
use crate::storage::{Document, FileStat, FileStore, MatchSource};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

const LIST_PREVIEW_CHARS: usize = 200;
const INFO_PREVIEW_CHARS: usize = 500;

/// What the document (or the file itself) says about one artifact.
struct Transcript {
    text: Option<String>,
    metadata: Value,
}

impl Transcript {
    fn has_text(&self) -> bool {
        self.text.is_some()
    }
}

/// Find the text behind `name`: the record keyed by it, a record linking it,
/// or for `.txt` artifacts the file content itself.
async fn transcript_for(files: &FileStore, document: &Document, name: &str) -> Transcript {
    if let Some(found) = document.lookup(name) {
        let text = found.record.data.body().map(str::to_string);
        let metadata = match found.source {
            MatchSource::DirectMatch => json!({
                "source": "direct_match",
                "hasTranscription": text.is_some()
            }),
            MatchSource::LinkedEntry { entry_id } => json!({
                "source": "linked_entry",
                "entryId": entry_id,
                "hasAudio": found.record.data.audio_file.is_some(),
                "savedAt": found.record.data.saved_at,
                "type": found.record.data.kind.as_deref().unwrap_or("unknown")
            }),
        };
        return Transcript { text, metadata };
    }

    if media::extension_of(name) == ".txt" {
        let content = match files.resolve(name) {
            Ok(file) => files.read_to_string(&file).await,
            Err(e) => Err(e),
        };
        match content {
            Ok(text) => {
                return Transcript {
                    text: Some(text),
                    metadata: json!({ "source": "text_file", "hasTranscription": true }),
                }
            }
            Err(e) => warn!(filename = %name, error = %e, "Could not read text artifact"),
        }
    }

    Transcript {
        text: None,
        metadata: json!({ "source": "file_only", "hasTranscription": false }),
    }
}

fn file_entry(name: &str, stat: &FileStat, transcript: Transcript, preview_chars: usize) -> Value {
    json!({
        "id": format!("{}_{}", name, stat.modified_at.timestamp_millis()),
        "name": name,
        "path": format!("/uploads/{}", name),
        "downloadUrl": format!("/api/files/download/{}", name),
        "size": stat.size,
        "formattedSize": media::format_size(stat.size),
        "type": media::file_kind(name),
        "extension": media::extension_of(name),
        "modified": stat.modified_at.to_rfc3339(),
        "created": stat.created_at.map(|at| at.to_rfc3339()),
        "hasTranscription": transcript.has_text(),
        "transcription": transcript.text.as_deref().map(|text| preview(text, preview_chars)),
        "metadata": transcript.metadata
    })
}

/// List every artifact, newest first.
///
/// ## Endpoint: `GET /api/files`
///
/// ## Response:
/// ```json
/// {
///   "success": true,
///   "count": 2,
///   "files": [
///     {
///       "name": "standup.txt",
///       "size": 42,
///       "formattedSize": "42 Bytes",
///       "type": "text",
///       "hasTranscription": true,
///       "metadata": { "source": "linked_entry", "entryId": "live_1712345678901" }
///     }
///   ],
///   "summary": { "totalFiles": 2, "audioFiles": 1, "textFiles": 1, "otherFiles": 0, "filesWithTranscriptions": 2 }
/// }
/// ```
pub async fn list_files(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let stored = state.files.list().await?;
    let document = state.records.read().await?;

    let mut files = Vec::with_capacity(stored.len());
    let (mut audio, mut text, mut other, mut transcribed) = (0, 0, 0, 0);

    for file in &stored {
        let transcript = transcript_for(&state.files, &document, &file.name).await;
        if transcript.has_text() {
            transcribed += 1;
        }
        match media::file_kind(&file.name) {
            FileKind::Audio => audio += 1,
            FileKind::Text => text += 1,
            FileKind::Image | FileKind::Other => other += 1,
        }
        files.push(file_entry(&file.name, &file.stat, transcript, LIST_PREVIEW_CHARS));
    }

    debug!(count = files.len(), "Listed upload directory");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": files.len(),
        "directory": state.files.root().display().to_string(),
        "files": files,
        "summary": {
            "totalFiles": stored.len(),
            "audioFiles": audio,
            "textFiles": text,
            "otherFiles": other,
            "filesWithTranscriptions": transcribed
        }
    })))
}

/// ## Endpoint: `GET /api/files/info/{filename}`
pub async fn file_info(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let file = state.files.resolve(&path.into_inner())?;
    let stat = state.files.stat(&file).await?;
    let document = state.records.read().await?;

    let transcript = transcript_for(&state.files, &document, file.name()).await;
    let qa_context_url = transcript
        .has_text()
        .then(|| format!("/api/qa/context/{}", file.name()));

    let mut info = file_entry(file.name(), &stat, transcript, INFO_PREVIEW_CHARS);
    info["filename"] = json!(file.name());
    info["mimeType"] = json!(media::mime_type(file.name()));
    info["qaContextUrl"] = json!(qa_context_url);

    Ok(HttpResponse::Ok().json(json!({ "success": true, "file": info })))
}

/// ## Endpoint: `GET /api/files/download/{filename}`
pub async fn download_file(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let file = state.files.resolve(&path.into_inner())?;
    let body = state.files.open_with_header(&file, range_header(&req)).await?;
    let builder = file_response(&body, media::mime_type(file.name()), file.name(), Disposition::Attachment);
    Ok(stream_body(builder, body))
}

/// Delete one artifact and drop every reference to it.
///
/// ## Endpoint: `DELETE /api/files/{filename}`
///
/// ## Response:
/// ```json
/// {
///   "success": true,
///   "message": "File \"standup.txt\" deleted successfully",
///   "filename": "standup.txt",
///   "deletedAt": "2025-01-01T12:00:00+00:00",
///   "indexRepaired": true,
///   "repair": { "touchedRecords": ["live_1712345678901"], "removedRecords": [], "removedAliases": ["standup.txt"] }
/// }
/// ```
pub async fn delete_file(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let outcome = state.links.delete_artifact(&path.into_inner()).await?;

    let mut body = serde_json::to_value(&outcome)?;
    body["success"] = json!(true);
    body["message"] = json!(format!("File \"{}\" deleted successfully", outcome.filename));
    Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    #[serde(default)]
    pub filenames: Vec<String>,
}

/// ## Endpoint: `DELETE /api/files/batch`
///
/// Missing files are reported per item; the request itself still succeeds.
pub async fn delete_files(
    state: web::Data<AppState>,
    request: web::Json<BulkDeleteRequest>,
) -> Result<HttpResponse, AppError> {
    let report = state.links.delete_artifacts(&request.filenames).await?;

    let mut body = serde_json::to_value(&report)?;
    body["success"] = json!(true);
    Ok(HttpResponse::Ok().json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::configure;
    use crate::handlers::test_support::{state_in, FakeTranscriber};
    use crate::storage::LiveEntry;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::Map;

    async fn seed(state: &AppState) -> String {
        let text = state.files.resolve("standup.txt").unwrap();
        state.files.write(&text, b"daily standup notes").await.unwrap();
        let audio = state.files.resolve("1700000000000-abcd1234.webm").unwrap();
        state.files.write(&audio, &[0u8; 100]).await.unwrap();
        let loose = state.files.resolve("loose.txt").unwrap();
        state.files.write(&loose, b"not in the document").await.unwrap();
        let other = state.files.resolve("cover.bin").unwrap();
        state.files.write(&other, b"\x00\x01").await.unwrap();

        state
            .records
            .upsert_live_entry(LiveEntry {
                text: "daily standup notes".to_string(),
                text_file: "standup.txt".to_string(),
                audio_file: Some("1700000000000-abcd1234.webm".to_string()),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[actix_web::test]
    async fn test_listing_joins_document_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, FakeTranscriber::Text("unused"));
        seed(&state).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(web::scope("/api").configure(configure)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/files").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 4);
        assert_eq!(body["summary"]["audioFiles"], 1);
        assert_eq!(body["summary"]["textFiles"], 2);
        assert_eq!(body["summary"]["otherFiles"], 1);
        assert_eq!(body["summary"]["filesWithTranscriptions"], 3);

        let by_name = |name: &str| -> Value {
            body["files"]
                .as_array()
                .unwrap()
                .iter()
                .find(|f| f["name"] == name)
                .cloned()
                .unwrap()
        };
        // aliases resolve directly to the live record
        assert_eq!(by_name("standup.txt")["metadata"]["source"], "direct_match");
        assert_eq!(by_name("loose.txt")["metadata"]["source"], "text_file");
        assert_eq!(by_name("cover.bin")["metadata"]["source"], "file_only");
        assert_eq!(by_name("1700000000000-abcd1234.webm")["formattedSize"], "100 Bytes");
        assert_eq!(by_name("1700000000000-abcd1234.webm")["type"], "audio");
    }

    #[actix_web::test]
    async fn test_info_reports_linked_entry() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, FakeTranscriber::Text("unused"));
        let id = seed(&state).await;
        // a record that only links the artifact, without an alias key
        state
            .records
            .transaction(|doc| {
                doc.remove("standup.txt");
                Ok(())
            })
            .await
            .unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(web::scope("/api").configure(configure)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/files/info/standup.txt").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let file = &body["file"];
        assert_eq!(file["metadata"]["source"], "linked_entry");
        assert_eq!(file["metadata"]["entryId"], id.as_str());
        assert_eq!(file["mimeType"], "text/plain");
        assert_eq!(file["qaContextUrl"], "/api/qa/context/standup.txt");

        let req = test::TestRequest::get().uri("/api/files/info/absent.txt").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_delete_then_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, FakeTranscriber::Text("unused"));
        let id = seed(&state).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .service(web::scope("/api").configure(configure)),
        )
        .await;

        let req = test::TestRequest::delete()
            .uri("/api/files/1700000000000-abcd1234.webm")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["indexRepaired"], true);

        let record = state.records.get(&id).await.unwrap().unwrap();
        assert_eq!(record.data.audio_file, None);
        assert_eq!(record.data.text.as_deref(), Some("daily standup notes"));

        let req = test::TestRequest::delete()
            .uri("/api/files/1700000000000-abcd1234.webm")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_bulk_delete_reports_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, FakeTranscriber::Text("unused"));
        seed(&state).await;
        state
            .records
            .upsert_by_single_file("loose.txt", "not in the document", Map::new())
            .await
            .unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .service(web::scope("/api").configure(configure)),
        )
        .await;

        let req = test::TestRequest::delete()
            .uri("/api/files/batch")
            .set_json(json!({ "filenames": ["loose.txt", "cover.bin", "ghost.mp3"] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["deleted"], 2);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["errors"][0]["filename"], "ghost.mp3");
        assert_eq!(body["errors"][0]["error"], "File not found");
        assert!(state.records.get("loose.txt").await.unwrap().is_none());

        let req = test::TestRequest::delete()
            .uri("/api/files/batch")
            .set_json(json!({ "filenames": [] }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
