use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Effective configuration. Read-only: the storage components are wired up
/// from it once at startup.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = &state.config;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "storage": {
                "upload_dir": config.storage.upload_dir.display().to_string(),
                "document_path": config.storage.document_path.display().to_string(),
                "max_upload_bytes": config.storage.max_upload_bytes
            },
            "transcription": {
                "program": config.transcription.program,
                "script": config.transcription.script.as_ref().map(|p| p.display().to_string()),
                "timeout_secs": config.transcription.timeout_secs
            },
            "environment": config.environment
        }
    })))
}
