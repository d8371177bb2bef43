//! Question answering endpoints.
//!
//! ## Available Endpoints:
//! - `POST /api/qa` - answer a question, optionally against a context string
//! - `GET /api/qa/knowledge-base` - categories the canned answers cover
//! - `GET /api/qa/context/{filename}` - text of the record behind a filename

use crate::error::AppError;
use crate::retrieval::{Answer, SUPPORTED_QUERIES};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    #[serde(default)]
    pub question: String,
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
struct QuestionResponse<'a> {
    success: bool,
    question: &'a str,
    #[serde(flatten)]
    answer: Answer,
    timestamp: String,
}

/// ## Endpoint: `POST /api/qa`
///
/// ## Request Body:
/// ```json
/// { "question": "What did we decide about the budget?", "context": "optional text" }
/// ```
///
/// ## Response:
/// ```json
/// {
///   "success": true,
///   "question": "What did we decide about the budget?",
///   "answer": "In your saved transcription \"standup.txt\", I found: ...",
///   "source": "saved_transcriptions",
///   "keyword": "budget",
///   "filename": "standup.txt",
///   "savedAt": "2025-01-01T12:00:00+00:00",
///   "timestamp": "2025-01-01T12:05:00+00:00"
/// }
/// ```
pub async fn ask_question(
    state: web::Data<AppState>,
    request: web::Json<QuestionRequest>,
) -> Result<HttpResponse, AppError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(AppError::InvalidInput(
            "Question is required and must be a non-empty string".to_string(),
        ));
    }

    info!(
        question = %question.chars().take(100).collect::<String>(),
        context_len = request.context.as_ref().map(String::len).unwrap_or(0),
        "Q&A request"
    );

    let answer = state
        .retrieval
        .answer(question, request.context.as_deref())
        .await;

    Ok(HttpResponse::Ok().json(QuestionResponse {
        success: true,
        question,
        answer,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// ## Endpoint: `GET /api/qa/knowledge-base`
pub async fn knowledge_base(state: web::Data<AppState>) -> HttpResponse {
    let categories = state.retrieval.knowledge_base_summary();
    HttpResponse::Ok().json(json!({
        "success": true,
        "totalCategories": categories.len(),
        "categories": categories,
        "supportedQueries": SUPPORTED_QUERIES
    }))
}

/// ## Endpoint: `GET /api/qa/context/{filename}`
pub async fn transcription_context(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let view = state.retrieval.context_for(&path.into_inner()).await?;
    let mut body = serde_json::to_value(view)?;
    body["success"] = json!(true);
    Ok(HttpResponse::Ok().json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::configure;
    use crate::handlers::test_support::{state_in, FakeTranscriber};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{Map, Value};

    #[actix_web::test]
    async fn test_question_answered_from_saved_record() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, FakeTranscriber::Text("unused"));
        state
            .records
            .upsert_by_single_file("standup.txt", "The deployment moved to Thursday.", Map::new())
            .await
            .unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(web::scope("/api").configure(configure)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/qa")
            .set_json(json!({ "question": "deployment status" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["question"], "deployment status");
        assert_eq!(body["source"], "saved_transcriptions");
        assert_eq!(body["filename"], "standup.txt");
        assert!(body["timestamp"].is_string());

        let req = test::TestRequest::get().uri("/api/qa/context/standup.txt").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["text"], "The deployment moved to Thursday.");
        assert_eq!(body["contextAvailable"], true);
        assert_eq!(body["hasAudio"], false);
    }

    #[actix_web::test]
    async fn test_blank_question_and_unknown_context() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir, FakeTranscriber::Text("unused"));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(web::scope("/api").configure(configure)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/qa")
            .set_json(json!({ "question": "  " }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/qa/context/none.txt").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/api/qa/knowledge-base").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["totalCategories"], 7);
        assert_eq!(body["categories"].as_array().unwrap().len(), 7);
    }
}
