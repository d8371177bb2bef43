//! # Record Store
//!
//! Sole owner of `transcriptions.json`. Every mutation runs the same cycle:
//!
//! 1. acquire the process-wide writer lock
//! 2. load the document from disk
//! 3. mutate it in memory
//! 4. save it atomically (temp file + fsync + rename)
//!
//! Holding the lock across the whole cycle is what prevents lost updates:
//! two concurrent saves can no longer each load a stale copy and overwrite
//! the other's change. Reads do not take the lock; they may observe a
//! document that is one write behind, never a half-written one.
//!
//! ## Corrupt documents:
//! A document that fails to parse is read as empty so that listings and
//! search keep working, but the condition is logged at `warn` every time.
//! Before the first write-back over it, the unreadable bytes are copied to
//! `transcriptions.json.corrupt-<timestamp>`; if that copy fails the write
//! is refused.
//!
//! No cross-process coordination is attempted: this store assumes a single
//! server instance.

use crate::error::{AppError, AppResult};
use crate::links::{self, LinkRepair};
use crate::storage::document::{Document, Entry, Record, RecordData, LIVE_TRANSCRIPTION};
use chrono::Utc;
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// State of the document file as last seen on disk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Missing,
    Ok,
    Corrupt,
}

/// Result of reading the document from disk.
struct Loaded {
    document: Document,
    /// Parse error if the file exists but is not a valid document.
    corrupt: Option<String>,
}

/// Input for [`RecordStore::upsert_live_entry`].
#[derive(Debug, Clone, Default)]
pub struct LiveEntry {
    pub text: String,
    pub text_file: String,
    pub audio_file: Option<String>,
    pub file_type: Option<String>,
    /// Upload metadata (`originalName`, `savedName`, `size`, `mimetype`).
    pub audio_details: Option<Value>,
}

/// A restartable view over the records of one document snapshot.
#[derive(Debug, Clone)]
pub struct RecordSet {
    document: Document,
}

impl RecordSet {
    /// Lazily iterate all records in stored order.
    pub fn iter(&self) -> impl Iterator<Item = Record> + '_ {
        self.document
            .records()
            .map(|(key, data)| Record::new(key, data.clone()))
    }

    /// Lazily iterate the records accepted by `predicate`.
    pub fn matching<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = Record> + 'a
    where
        P: Fn(&RecordData) -> bool + 'a,
    {
        self.document
            .records()
            .filter(move |(_, data)| predicate(data))
            .map(|(key, data)| Record::new(key, data.clone()))
    }

    pub fn len(&self) -> usize {
        self.document.records().count()
    }
}

/// The JSON-file-backed record store.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    /// Serializes every load→mutate→save cycle in this process.
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> AppResult<Loaded> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Loaded {
                    document: Document::default(),
                    corrupt: None,
                })
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Loaded {
                document: Document::default(),
                corrupt: None,
            });
        }

        match serde_json::from_slice::<Document>(&bytes) {
            Ok(document) => Ok(Loaded {
                document,
                corrupt: None,
            }),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Transcription document is corrupt; treating it as empty for this read"
                );
                Ok(Loaded {
                    document: Document::default(),
                    corrupt: Some(e.to_string()),
                })
            }
        }
    }

    /// Current document snapshot. Does not take the writer lock.
    pub async fn read(&self) -> AppResult<Document> {
        Ok(self.load().await?.document)
    }

    /// Whether the document exists and parses.
    pub async fn status(&self) -> DocumentStatus {
        match self.load().await {
            Ok(Loaded { corrupt: Some(_), .. }) => DocumentStatus::Corrupt,
            Ok(_) if tokio::fs::metadata(&self.path).await.is_ok() => DocumentStatus::Ok,
            Ok(_) => DocumentStatus::Missing,
            Err(_) => DocumentStatus::Corrupt,
        }
    }

    /// Serialize and atomically replace the document file.
    async fn save(&self, document: &Document) -> AppResult<()> {
        let json = serde_json::to_vec_pretty(document)
            .map_err(|e| AppError::Internal(format!("Failed to serialize document: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&json).await?;
            file.flush().await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!(path = %self.path.display(), entries = document.len(), "Document saved");
        Ok(())
    }

    /// Copy unreadable bytes aside before they are overwritten.
    async fn preserve_corrupt(&self, reason: &str) -> AppResult<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("transcriptions.json");
        let backup = self.path.with_file_name(format!(
            "{}.corrupt-{}",
            file_name,
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ));

        tokio::fs::copy(&self.path, &backup).await.map_err(|e| {
            AppError::Corrupt(format!(
                "Document is corrupt ({}) and could not be backed up: {}",
                reason, e
            ))
        })?;

        warn!(
            path = %self.path.display(),
            backup = %backup.display(),
            reason = %reason,
            "Overwriting corrupt transcription document; previous content preserved in backup"
        );
        Ok(backup)
    }

    /// Run `mutate` inside one locked load→mutate→save cycle.
    ///
    /// Nothing is written if `mutate` fails or leaves the document unchanged.
    pub async fn transaction<F, R>(&self, mutate: F) -> AppResult<R>
    where
        F: FnOnce(&mut Document) -> AppResult<R>,
    {
        let _guard = self.write_lock.lock().await;

        let Loaded { document, corrupt } = self.load().await?;
        let mut working = document.clone();
        let result = mutate(&mut working)?;

        if working == document {
            return Ok(result);
        }

        if let Some(reason) = corrupt {
            self.preserve_corrupt(&reason).await?;
        }
        self.save(&working).await?;
        Ok(result)
    }

    /// Save a file and its transcription under the file's own name.
    ///
    /// Writes `document[filename] = {text, savedAt, filePath, size, ...extra}`.
    pub async fn upsert_by_single_file(
        &self,
        filename: &str,
        text: &str,
        extra: Map<String, Value>,
    ) -> AppResult<Record> {
        require_text(text)?;
        if filename.trim().is_empty() {
            return Err(AppError::InvalidInput("Filename is required".to_string()));
        }

        let mut data = RecordData {
            text: Some(text.to_string()),
            saved_at: Some(Utc::now().to_rfc3339()),
            size: Some(text.len() as u64),
            ..Default::default()
        };
        data.extra
            .insert("filePath".to_string(), Value::String(format!("/uploads/{}", filename)));
        data.extra.extend(extra);

        let key = filename.to_string();
        let stored = data.clone();
        self.transaction(move |doc| {
            doc.insert_record(key, stored);
            Ok(())
        })
        .await?;

        info!(filename = %filename, size = text.len(), "Single-file record saved");
        Ok(Record::new(filename, data))
    }

    /// Record produced by the upload-and-transcribe route.
    pub async fn upsert_transcription(
        &self,
        filename: &str,
        text: &str,
        original_name: &str,
        file_size: u64,
    ) -> AppResult<Record> {
        let mut extra = Map::new();
        extra.insert("transcription".to_string(), Value::String(text.to_string()));
        extra.insert("originalName".to_string(), Value::String(original_name.to_string()));
        extra.insert("uploadedAt".to_string(), Value::String(Utc::now().to_rfc3339()));
        extra.insert("fileSize".to_string(), Value::from(file_size));
        self.upsert_by_single_file(filename, text, extra).await
    }

    /// Save a live transcription with its text (and optional audio) artifact.
    ///
    /// The record goes under `live_<millis>`; `textFile` and `audioFile` are
    /// added as aliases pointing at it. Ids are unique per document: if the
    /// millisecond is already taken the timestamp is advanced.
    pub async fn upsert_live_entry(&self, entry: LiveEntry) -> AppResult<Record> {
        require_text(&entry.text)?;
        if entry.text_file.trim().is_empty() {
            return Err(AppError::InvalidInput("Text file name is required".to_string()));
        }

        let record = self
            .transaction(move |doc| {
                let artifacts = std::iter::once(&entry.text_file).chain(entry.audio_file.as_ref());
                for artifact in artifacts {
                    if matches!(doc.entry(artifact), Some(Entry::Record(_))) {
                        warn!(filename = %artifact, "Live save would replace an existing record; refusing");
                        return Err(AppError::InvalidInput(format!(
                            "File name already belongs to a saved transcription: {}",
                            artifact
                        )));
                    }
                }

                let mut millis = Utc::now().timestamp_millis();
                let id = loop {
                    let candidate = format!("live_{}", millis);
                    if !doc.contains_key(&candidate) {
                        break candidate;
                    }
                    millis += 1;
                };

                let mut data = RecordData {
                    id: Some(id.clone()),
                    text: Some(entry.text.clone()),
                    text_file: Some(entry.text_file.clone()),
                    audio_file: entry.audio_file.clone(),
                    kind: Some(LIVE_TRANSCRIPTION.to_string()),
                    saved_at: Some(Utc::now().to_rfc3339()),
                    size: Some(entry.text.len() as u64),
                    ..Default::default()
                };
                data.extra
                    .insert("hasAudio".to_string(), Value::Bool(entry.audio_file.is_some()));
                if let Some(file_type) = &entry.file_type {
                    data.extra
                        .insert("fileType".to_string(), Value::String(file_type.clone()));
                }
                if let Some(details) = &entry.audio_details {
                    data.extra.insert("audioDetails".to_string(), details.clone());
                }

                doc.insert_record(id.clone(), data.clone());
                doc.insert_alias(entry.text_file.clone(), id.clone());
                if let Some(audio) = &entry.audio_file {
                    doc.insert_alias(audio.clone(), id.clone());
                }

                Ok(Record::new(id, data))
            })
            .await?;

        info!(
            id = %record.id,
            text_file = ?record.data.text_file,
            audio_file = ?record.data.audio_file,
            "Live transcription saved"
        );
        Ok(record)
    }

    /// Look up a record by id or alias (one level of indirection).
    pub async fn get(&self, key: &str) -> AppResult<Option<Record>> {
        Ok(self.read().await?.get(key))
    }

    /// First record whose `textFile` or `audioFile` equals `filename`.
    pub async fn find_by_artifact(&self, filename: &str) -> AppResult<Option<Record>> {
        Ok(self.read().await?.find_by_artifact(filename))
    }

    /// A restartable record sequence over the current snapshot.
    pub async fn list_all(&self) -> AppResult<RecordSet> {
        Ok(RecordSet {
            document: self.read().await?,
        })
    }

    /// Drop every reference to a deleted artifact in one locked cycle.
    pub async fn remove_artifact_reference(&self, filename: &str) -> AppResult<LinkRepair> {
        let filename = filename.to_string();
        self.transaction(move |doc| Ok(links::prune_artifact(doc, &filename)))
            .await
    }

    /// Same as [`remove_artifact_reference`](Self::remove_artifact_reference)
    /// for several artifacts, with a single save.
    pub async fn remove_artifact_references(
        &self,
        filenames: &[String],
    ) -> AppResult<Vec<(String, LinkRepair)>> {
        let filenames = filenames.to_vec();
        self.transaction(move |doc| {
            Ok(filenames
                .into_iter()
                .map(|name| {
                    let repair = links::prune_artifact(doc, &name);
                    (name, repair)
                })
                .collect())
        })
        .await
    }
}

fn require_text(text: &str) -> AppResult<()> {
    if text.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "No text provided or text is empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> RecordStore {
        RecordStore::new(dir.path().join("transcriptions.json"))
    }

    fn live(text: &str, text_file: &str, audio_file: Option<&str>) -> LiveEntry {
        LiveEntry {
            text: text.to_string(),
            text_file: text_file.to_string(),
            audio_file: audio_file.map(str::to_string),
            file_type: Some("webm".to_string()),
            audio_details: None,
        }
    }

    #[tokio::test]
    async fn test_live_entry_round_trips_through_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let saved = store
            .upsert_live_entry(live("quarterly planning", "plan.txt", Some("1-a.webm")))
            .await
            .unwrap();
        assert!(saved.id.starts_with("live_"));

        for key in [saved.id.as_str(), "plan.txt", "1-a.webm"] {
            let record = store.get(key).await.unwrap().unwrap();
            assert_eq!(record.data.text.as_deref(), Some("quarterly planning"));
            assert_eq!(record.id, saved.id);
        }

        let doc = store.read().await.unwrap();
        assert!(doc.dangling_aliases().is_empty());
        assert_eq!(
            doc.get(&saved.id).unwrap().data.extra.get("hasAudio"),
            Some(&Value::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_live_entry_never_replaces_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .upsert_by_single_file("standup.txt", "budget approved monday", Map::new())
            .await
            .unwrap();

        let err = store
            .upsert_live_entry(live("second standup", "standup.txt", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let doc = store.read().await.unwrap();
        assert_eq!(doc.len(), 1);
        let kept = doc.get("standup.txt").unwrap();
        assert_eq!(kept.id, "standup.txt");
        assert_eq!(kept.data.text.as_deref(), Some("budget approved monday"));
    }

    #[tokio::test]
    async fn test_single_file_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let saved = store
            .upsert_by_single_file("notes.txt", "héllo", Map::new())
            .await
            .unwrap();
        assert_eq!(saved.id, "notes.txt");
        assert_eq!(saved.data.size, Some("héllo".len() as u64));

        let record = store.get("notes.txt").await.unwrap().unwrap();
        assert_eq!(record.data.text.as_deref(), Some("héllo"));
        assert_eq!(
            record.data.extra.get("filePath"),
            Some(&Value::String("/uploads/notes.txt".to_string()))
        );
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let err = store
            .upsert_by_single_file("a.txt", "   ", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err = store.upsert_live_entry(live("", "a.txt", None)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_concurrent_live_saves_both_survive() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .upsert_live_entry(live(&format!("entry {}", i), &format!("e{}.txt", i), None))
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id);
        }

        let doc = store.read().await.unwrap();
        for (i, id) in ids.iter().enumerate() {
            assert!(doc.get(id).is_some(), "record {} lost", id);
            assert!(doc.get(&format!("e{}.txt", i)).is_some());
        }
        assert_eq!(doc.records().count(), 8);
    }

    #[tokio::test]
    async fn test_corrupt_document_reads_empty_and_is_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), b"{ not json").await.unwrap();

        assert_eq!(store.status().await, DocumentStatus::Corrupt);
        assert!(store.read().await.unwrap().is_empty());

        store
            .upsert_by_single_file("fresh.txt", "new content", Map::new())
            .await
            .unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("transcriptions.json.corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
        let preserved = std::fs::read(dir.path().join(&backups[0])).unwrap();
        assert_eq!(preserved, b"{ not json");

        assert_eq!(store.status().await, DocumentStatus::Ok);
        assert!(store.get("fresh.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_document_is_empty_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.status().await, DocumentStatus::Missing);
        assert!(store.list_all().await.unwrap().iter().next().is_none());
    }

    #[tokio::test]
    async fn test_list_all_filters_and_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .upsert_by_single_file("a.txt", "plain one", Map::new())
            .await
            .unwrap();
        store
            .upsert_live_entry(live("live one", "b.txt", None))
            .await
            .unwrap();

        let set = store.list_all().await.unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().count(), 2);
        assert_eq!(set.iter().count(), 2);

        let live_only: Vec<Record> = set.matching(|r| r.is_kind(LIVE_TRANSCRIPTION)).collect();
        assert_eq!(live_only.len(), 1);
        assert_eq!(live_only[0].data.text_file.as_deref(), Some("b.txt"));
    }

    #[tokio::test]
    async fn test_unchanged_transaction_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.transaction(|_| Ok(())).await.unwrap();
        assert!(!store.path().exists());
    }
}
