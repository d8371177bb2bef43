//! Question answering over the knowledge base, an explicit context string
//! and the saved records.
//!
//! The pipeline never fails: a store that cannot be read is logged and the
//! question falls through to the default answer.

use super::keywords::{self, Confidence};
use super::knowledge_base;
use crate::error::{AppError, AppResult};
use crate::storage::RecordStore;
use chrono::Local;
use rand::seq::IndexedRandom;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which stage produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    KnowledgeBase,
    ContextSearch,
    SavedTranscriptions,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub answer: String,
    pub source: AnswerSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// `savedAt` of the matching record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Answer {
    fn new(answer: String, source: AnswerSource) -> Self {
        Self {
            answer,
            source,
            category: None,
            keyword: None,
            confidence: None,
            filename: None,
            saved_at: None,
            suggestion: None,
        }
    }
}

/// Text of a record, as served to the QA context route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextView {
    pub filename: String,
    pub entry_id: String,
    pub text: String,
    pub saved_at: Option<String>,
    pub has_audio: bool,
    pub context_available: bool,
}

const DEFAULT_RESPONSES: &[&str] = &[
    "I heard you ask: \"{q}\". For more specific answers, please ask about your transcriptions or use more specific keywords.",
    "That's an interesting question about \"{q}\". You can ask me about your saved transcriptions or how to use the transcription features.",
    "Regarding \"{q}\", I can help you with transcription-related queries or questions about your saved audio files.",
    "Thanks for your question: \"{q}\". For more detailed answers, try asking about specific content from your transcriptions.",
];

const DEFAULT_SUGGESTION: &str =
    "Try asking about your transcriptions or say \"help\" for guidance.";

#[derive(Debug, Clone)]
pub struct RetrievalEngine {
    records: Arc<RecordStore>,
}

impl RetrievalEngine {
    pub fn new(records: Arc<RecordStore>) -> Self {
        Self { records }
    }

    /// Answer `question`, first match wins:
    /// knowledge base, then `context`, then saved records, then a default.
    pub async fn answer(&self, question: &str, context: Option<&str>) -> Answer {
        let lowered = question.to_lowercase();

        if let Some(category) = knowledge_base::match_question(lowered.trim()) {
            debug!(category = category.name, "Answered from knowledge base");
            let mut answer = Answer::new(category.respond(Local::now()), AnswerSource::KnowledgeBase);
            answer.category = Some(category.name.to_string());
            return answer;
        }

        if let Some(hit) = context.and_then(|ctx| keywords::search_context(question, ctx)) {
            debug!(keyword = %hit.keyword, "Answered from explicit context");
            let mut answer = Answer::new(
                format!(
                    "Based on your transcription, I found this about \"{}\":\n\n\"{}\"",
                    hit.keyword, hit.excerpt
                ),
                AnswerSource::ContextSearch,
            );
            answer.keyword = Some(hit.keyword);
            answer.confidence = Some(hit.confidence);
            return answer;
        }

        match self.records.list_all().await {
            Ok(records) => {
                if let Some(hit) = keywords::search_records(question, records.iter()) {
                    debug!(keyword = %hit.keyword, filename = %hit.filename, "Answered from saved records");
                    let mut answer = Answer::new(
                        format!(
                            "In your saved transcription \"{}\", I found:\n\n\"{}\"",
                            hit.filename, hit.excerpt
                        ),
                        AnswerSource::SavedTranscriptions,
                    );
                    answer.keyword = Some(hit.keyword);
                    answer.filename = Some(hit.filename);
                    answer.saved_at = Some(hit.timestamp);
                    return answer;
                }
            }
            Err(e) => warn!(error = %e, "Saved-record search skipped; record store unavailable"),
        }

        default_answer(question)
    }

    pub fn knowledge_base_summary(&self) -> Vec<knowledge_base::CategorySummary> {
        knowledge_base::summary(Local::now())
    }

    /// The record behind `filename` (key, alias or linked artifact).
    pub async fn context_for(&self, filename: &str) -> AppResult<ContextView> {
        let document = self.records.read().await?;
        let found = document
            .lookup(filename)
            .ok_or_else(|| AppError::not_found(format!("Transcription not found: {}", filename)))?;

        let data = found.record.data;
        let text = data.body().unwrap_or_default().to_string();
        Ok(ContextView {
            filename: filename.to_string(),
            entry_id: found.record.id,
            context_available: !text.is_empty(),
            text: if text.is_empty() {
                "No text available".to_string()
            } else {
                text
            },
            saved_at: data.saved_at.clone(),
            has_audio: data.audio_file.is_some(),
        })
    }
}

fn default_answer(question: &str) -> Answer {
    let template = DEFAULT_RESPONSES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(DEFAULT_RESPONSES[0]);
    let mut answer = Answer::new(template.replace("{q}", question), AnswerSource::Default);
    answer.suggestion = Some(DEFAULT_SUGGESTION.to_string());
    answer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LiveEntry;
    use serde_json::Map;

    fn engine(dir: &tempfile::TempDir) -> (RetrievalEngine, Arc<RecordStore>) {
        let records = Arc::new(RecordStore::new(dir.path().join("transcriptions.json")));
        (RetrievalEngine::new(Arc::clone(&records)), records)
    }

    #[tokio::test]
    async fn test_greeting_beats_capabilities() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(&dir);

        let answer = engine.answer("hello, what can you do", None).await;
        assert_eq!(answer.source, AnswerSource::KnowledgeBase);
        assert_eq!(answer.category.as_deref(), Some("greetings"));
    }

    #[tokio::test]
    async fn test_context_before_saved_records() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, records) = engine(&dir);
        records
            .upsert_by_single_file("notes.txt", "The budget was approved on Monday.", Map::new())
            .await
            .unwrap();

        // "summarize" is tried first but only "budget" occurs in the context
        let answer = engine
            .answer("Summarize the budget", Some("The budget grows next quarter."))
            .await;
        assert_eq!(answer.source, AnswerSource::ContextSearch);
        assert_eq!(answer.keyword.as_deref(), Some("budget"));
        assert_eq!(answer.confidence, Some(Confidence::High));

        let answer = engine.answer("Outline budget", None).await;
        assert_eq!(answer.source, AnswerSource::SavedTranscriptions);
        assert_eq!(answer.filename.as_deref(), Some("notes.txt"));
        assert!(answer.answer.contains("approved on Monday"));
    }

    #[tokio::test]
    async fn test_default_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(&dir);

        let answer = engine.answer("Quarterly revenue numbers", None).await;
        assert_eq!(answer.source, AnswerSource::Default);
        assert!(answer.answer.contains("Quarterly revenue numbers"));
        assert!(answer.suggestion.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_store_degrades_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, records) = engine(&dir);
        tokio::fs::write(records.path(), b"[broken").await.unwrap();

        let answer = engine.answer("Quarterly revenue numbers", None).await;
        assert_eq!(answer.source, AnswerSource::Default);
    }

    #[tokio::test]
    async fn test_context_for_follows_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, records) = engine(&dir);
        let saved = records
            .upsert_live_entry(LiveEntry {
                text: "retro notes".to_string(),
                text_file: "retro.txt".to_string(),
                audio_file: Some("1-r.webm".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let view = engine.context_for("1-r.webm").await.unwrap();
        assert_eq!(view.entry_id, saved.id);
        assert_eq!(view.text, "retro notes");
        assert!(view.has_audio);
        assert!(view.context_available);

        assert!(matches!(
            engine.context_for("missing.txt").await,
            Err(AppError::NotFound(_))
        ));
    }
}
