//! # Link Maintenance
//!
//! Keeps the transcription document consistent with the upload directory
//! when artifacts are deleted.
//!
//! ## Repair steps for one deleted filename:
//! 1. drop the top-level entry keyed by the filename (record or alias)
//! 2. clear `textFile` / `audioFile` fields that name it
//! 3. drop touched records that are left with no artifacts, few fields and no text
//! 4. sweep records that have shrunk to almost nothing and carry no text
//! 5. drop aliases whose target no longer exists
//!
//! A record that still has non-empty text is never removed by this pass,
//! whatever its field count.

use crate::error::{AppError, AppResult};
use crate::storage::document::{Document, Entry};
use crate::storage::{FileStore, RecordStore};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Field count at or below which a touched, artifact-less record is dropped.
const TOUCHED_RECORD_MAX_FIELDS: usize = 3;

/// Field count at or below which any text-less record is swept.
const DEGENERATE_RECORD_MAX_FIELDS: usize = 2;

/// What one call to [`prune_artifact`] changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRepair {
    /// Records that had an artifact field cleared.
    pub touched_records: Vec<String>,
    /// Record keys removed from the document.
    pub removed_records: Vec<String>,
    /// Alias keys removed from the document.
    pub removed_aliases: Vec<String>,
}

impl LinkRepair {
    pub fn is_empty(&self) -> bool {
        self.touched_records.is_empty()
            && self.removed_records.is_empty()
            && self.removed_aliases.is_empty()
    }
}

/// Remove every reference to `filename` from `doc`.
pub fn prune_artifact(doc: &mut Document, filename: &str) -> LinkRepair {
    let mut repair = LinkRepair::default();

    // scalars and arrays under the same key are not ours to drop
    let direct = matches!(
        doc.entry(filename),
        Some(Entry::Record(_) | Entry::Alias(_) | Entry::Opaque(Value::Object(_)))
    );
    if direct {
        if let Some(removed) = doc.remove(filename) {
            match removed {
                Entry::Alias(_) => repair.removed_aliases.push(filename.to_string()),
                _ => repair.removed_records.push(filename.to_string()),
            }
        }
    }

    let mut orphaned = Vec::new();
    for (key, data) in doc.records_mut() {
        if !data.references(filename) {
            continue;
        }

        if data.text_file.as_deref() == Some(filename) {
            data.text_file = None;
        }
        if data.audio_file.as_deref() == Some(filename) {
            data.audio_file = None;
            if data.extra.contains_key("hasAudio") {
                data.extra.insert("hasAudio".to_string(), Value::Bool(false));
            }
        }
        repair.touched_records.push(key.to_string());

        if !data.has_artifacts()
            && data.field_count() <= TOUCHED_RECORD_MAX_FIELDS
            && !data.has_text()
        {
            orphaned.push(key.to_string());
        }
    }

    let degenerate: Vec<String> = doc
        .records()
        .filter(|(_, data)| data.field_count() <= DEGENERATE_RECORD_MAX_FIELDS && !data.has_text())
        .map(|(key, _)| key.to_string())
        .collect();

    let mut seen = HashSet::new();
    for key in orphaned.into_iter().chain(degenerate) {
        if seen.insert(key.clone()) && doc.remove(&key).is_some() {
            repair.removed_records.push(key);
        }
    }

    for alias in doc.dangling_aliases() {
        doc.remove(&alias);
        repair.removed_aliases.push(alias);
    }

    debug!(
        filename = %filename,
        touched = repair.touched_records.len(),
        removed_records = repair.removed_records.len(),
        removed_aliases = repair.removed_aliases.len(),
        "Pruned artifact references"
    );
    repair
}

/// Result of deleting one artifact through the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub filename: String,
    pub deleted_at: String,
    /// `false` if the file is gone but the document could not be updated.
    pub index_repaired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<LinkRepair>,
}

/// Per-file result of a bulk delete.
#[derive(Debug, Clone, Serialize)]
pub struct BulkDeleteItem {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteReport {
    pub deleted: usize,
    pub failed: usize,
    pub results: Vec<BulkDeleteItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BulkDeleteItem>,
    pub index_repaired: bool,
}

/// Deletes artifacts and repairs the document afterwards.
#[derive(Debug, Clone)]
pub struct LinkMaintainer {
    files: Arc<FileStore>,
    records: Arc<RecordStore>,
}

impl LinkMaintainer {
    pub fn new(files: Arc<FileStore>, records: Arc<RecordStore>) -> Self {
        Self { files, records }
    }

    /// Repair the document after `filename` has been removed from disk.
    pub async fn on_file_deleted(&self, filename: &str) -> AppResult<LinkRepair> {
        self.records.remove_artifact_reference(filename).await
    }

    /// Bulk form of [`on_file_deleted`](Self::on_file_deleted): one load, one save.
    pub async fn on_files_deleted(&self, filenames: &[String]) -> AppResult<Vec<(String, LinkRepair)>> {
        if filenames.is_empty() {
            return Ok(Vec::new());
        }
        self.records.remove_artifact_references(filenames).await
    }

    /// Delete one artifact and repair the document.
    ///
    /// Fails only if the file itself cannot be deleted. A failure while
    /// updating the document is logged and reported as
    /// `index_repaired = false`.
    pub async fn delete_artifact(&self, raw_name: &str) -> AppResult<DeleteOutcome> {
        let file = self.files.resolve(raw_name)?;
        self.files.delete(&file).await?;

        let (index_repaired, repair) = match self.on_file_deleted(file.name()).await {
            Ok(repair) => (true, Some(repair)),
            Err(e) => {
                error!(filename = %file.name(), error = %e, "File deleted but transcription document was not updated");
                (false, None)
            }
        };

        info!(filename = %file.name(), index_repaired, "Artifact deleted");
        Ok(DeleteOutcome {
            filename: file.name().to_string(),
            deleted_at: Utc::now().to_rfc3339(),
            index_repaired,
            repair,
        })
    }

    /// Delete several artifacts; missing files are reported per item.
    pub async fn delete_artifacts(&self, raw_names: &[String]) -> AppResult<BulkDeleteReport> {
        if raw_names.is_empty() {
            return Err(AppError::InvalidInput(
                "Array of filenames is required".to_string(),
            ));
        }

        let mut results = Vec::new();
        let mut errors = Vec::new();
        let mut deleted = Vec::new();

        for raw in raw_names {
            let outcome = match self.files.resolve(raw) {
                Ok(file) => self.files.delete(&file).await.map(|_| file.name().to_string()),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(name) => {
                    results.push(BulkDeleteItem {
                        filename: name.clone(),
                        success: true,
                        message: Some("Deleted successfully".to_string()),
                        error: None,
                    });
                    deleted.push(name);
                }
                Err(e) => {
                    let message = match &e {
                        AppError::NotFound(_) => "File not found".to_string(),
                        other => other.to_string(),
                    };
                    warn!(filename = %raw, error = %e, "Bulk delete item failed");
                    errors.push(BulkDeleteItem {
                        filename: raw.clone(),
                        success: false,
                        message: None,
                        error: Some(message),
                    });
                }
            }
        }

        let index_repaired = match self.on_files_deleted(&deleted).await {
            Ok(_) => true,
            Err(e) => {
                error!(count = deleted.len(), error = %e, "Files deleted but transcription document was not updated");
                false
            }
        };

        info!(deleted = results.len(), failed = errors.len(), "Bulk delete finished");
        Ok(BulkDeleteReport {
            deleted: results.len(),
            failed: errors.len(),
            results,
            errors,
            index_repaired,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LiveEntry;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_non_object_value_under_filename_is_kept() {
        let mut d = doc(json!({
            "notes.txt": [1, 2, 3],
            "count.txt": 7,
            "clip.webm": { "text": 42 }
        }));

        let repair = prune_artifact(&mut d, "notes.txt");
        assert!(repair.removed_records.is_empty());
        assert!(d.contains_key("notes.txt"));

        prune_artifact(&mut d, "count.txt");
        assert!(d.contains_key("count.txt"));

        let repair = prune_artifact(&mut d, "clip.webm");
        assert_eq!(repair.removed_records, vec!["clip.webm".to_string()]);
        assert!(!d.contains_key("clip.webm"));
    }

    #[test]
    fn test_text_survives_artifact_removal() {
        let mut d = doc(json!({
            "live_1": {
                "id": "live_1", "text": "keep me", "textFile": "a.txt",
                "audioFile": "a.webm", "type": "live_transcription", "hasAudio": true
            },
            "a.txt": "live_1",
            "a.webm": "live_1"
        }));

        let repair = prune_artifact(&mut d, "a.webm");
        assert_eq!(repair.removed_aliases, vec!["a.webm".to_string()]);
        assert_eq!(repair.touched_records, vec!["live_1".to_string()]);

        let record = d.get("live_1").unwrap();
        assert_eq!(record.data.audio_file, None);
        assert_eq!(record.data.extra.get("hasAudio"), Some(&json!(false)));

        prune_artifact(&mut d, "a.txt");
        let record = d.get("live_1").unwrap();
        assert!(!record.data.has_artifacts());
        assert_eq!(record.data.text.as_deref(), Some("keep me"));
        assert!(d.dangling_aliases().is_empty());
    }

    #[test]
    fn test_textless_orphans_are_removed() {
        let mut d = doc(json!({
            "rec": { "textFile": "x.txt", "savedAt": "2025-01-01T00:00:00Z" },
            "x.txt": "rec",
            "other": { "size": 3 },
            "kept": { "text": "still here" }
        }));

        let repair = prune_artifact(&mut d, "x.txt");
        assert!(repair.removed_records.contains(&"rec".to_string()));
        assert!(repair.removed_records.contains(&"other".to_string()));
        assert!(!d.contains_key("rec"));
        assert!(!d.contains_key("x.txt"));
        assert!(d.get("kept").is_some());
    }

    #[test]
    fn test_direct_record_removed_and_aliases_repaired() {
        let mut d = doc(json!({
            "notes.txt": { "text": "hello", "savedAt": "t", "filePath": "/uploads/notes.txt", "size": 5 },
            "stale": "notes.txt"
        }));

        let repair = prune_artifact(&mut d, "notes.txt");
        assert_eq!(repair.removed_records, vec!["notes.txt".to_string()]);
        assert_eq!(repair.removed_aliases, vec!["stale".to_string()]);
        assert!(d.is_empty());
    }

    #[test]
    fn test_unrelated_filename_changes_nothing() {
        let original = doc(json!({
            "notes.txt": { "text": "hello", "savedAt": "t" }
        }));
        let mut d = original.clone();
        let repair = prune_artifact(&mut d, "missing.webm");
        assert!(repair.is_empty());
        assert_eq!(d, original);
    }

    async fn fixture() -> (tempfile::TempDir, LinkMaintainer, Arc<FileStore>, Arc<RecordStore>) {
        let dir = tempfile::tempdir().unwrap();
        let files = Arc::new(FileStore::new(dir.path().join("uploads")));
        let records = Arc::new(RecordStore::new(dir.path().join("transcriptions.json")));
        let links = LinkMaintainer::new(Arc::clone(&files), Arc::clone(&records));
        (dir, links, files, records)
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, links, files, records) = fixture().await;

        let text = files.resolve("standup.txt").unwrap();
        let audio = files.resolve("1-a.webm").unwrap();
        files.write(&text, b"standup").await.unwrap();
        files.write(&audio, b"RIFF").await.unwrap();
        let saved = records
            .upsert_live_entry(LiveEntry {
                text: "standup".to_string(),
                text_file: "standup.txt".to_string(),
                audio_file: Some("1-a.webm".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let outcome = links.delete_artifact("1-a.webm").await.unwrap();
        assert!(outcome.index_repaired);
        let after_first = records.read().await.unwrap();
        assert!(after_first.dangling_aliases().is_empty());
        assert!(!after_first.contains_key("1-a.webm"));
        assert_eq!(after_first.get("standup.txt").unwrap().id, saved.id);

        let err = links.delete_artifact("1-a.webm").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(records.read().await.unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_bulk_delete_reports_each_file() {
        let (_dir, links, files, records) = fixture().await;

        for name in ["a.txt", "b.txt"] {
            let file = files.resolve(name).unwrap();
            files.write(&file, b"x").await.unwrap();
            records
                .upsert_by_single_file(name, "content", serde_json::Map::new())
                .await
                .unwrap();
        }

        let report = links
            .delete_artifacts(&[
                "a.txt".to_string(),
                "../b.txt".to_string(),
                "nope.txt".to_string(),
            ])
            .await
            .unwrap();

        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].error.as_deref(), Some("File not found"));
        assert!(report.index_repaired);
        assert!(records.read().await.unwrap().is_empty());

        assert!(matches!(
            links.delete_artifacts(&[]).await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
