//! # Transcription Document Model
//!
//! The on-disk `transcriptions.json` is a single JSON object. Each top-level
//! key maps either to a record object or to a string alias naming another
//! key. Instead of inspecting `typeof value` at every call site, values are
//! decoded once into the [`Entry`] enum and resolved explicitly.
//!
//! ## Layout example:
//! ```json
//! {
//!   "live_1712000000000": { "id": "live_1712000000000", "text": "...",
//!                           "textFile": "standup.txt", "audioFile": "1712-ab12cd34.webm",
//!                           "type": "live_transcription", "savedAt": "..." },
//!   "standup.txt": "live_1712000000000",
//!   "1712-ab12cd34.webm": "live_1712000000000",
//!   "notes.txt": { "text": "...", "savedAt": "...", "filePath": "/uploads/notes.txt", "size": 42 }
//! }
//! ```
//!
//! ## Ordering:
//! Keys keep their insertion order (`IndexMap`), so "first hit wins" scans
//! visit records in the order they were saved, and removals use
//! `shift_remove` so the remaining order is untouched.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `type` value written by live saves.
pub const LIVE_TRANSCRIPTION: &str = "live_transcription";

/// One top-level value of the document.
///
/// `Opaque` keeps anything that is neither a string nor a record-shaped
/// object (numbers, arrays, objects with mistyped fields) so that a
/// read-modify-write never drops data it does not understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Alias(String),
    Record(RecordData),
    Opaque(Value),
}

/// The stored fields of a transcription record.
///
/// Known fields are typed; everything else (`filePath`, `hasAudio`,
/// `audioDetails`, `originalName`, legacy `transcription`, ...) survives in
/// `extra` and is written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecordData {
    /// The searchable text of this record.
    ///
    /// Entries written by the upload-and-transcribe route before `text` was
    /// recorded only carry a `transcription` string, so fall back to it.
    pub fn body(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or_else(|| self.extra.get("transcription").and_then(Value::as_str))
    }

    /// `true` if the record still carries usable text.
    pub fn has_text(&self) -> bool {
        self.body().map(|t| !t.trim().is_empty()).unwrap_or(false)
    }

    /// Number of fields this record serializes to.
    pub fn field_count(&self) -> usize {
        [
            self.id.is_some(),
            self.text.is_some(),
            self.text_file.is_some(),
            self.audio_file.is_some(),
            self.kind.is_some(),
            self.saved_at.is_some(),
            self.size.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
            + self.extra.len()
    }

    pub fn has_artifacts(&self) -> bool {
        self.text_file.is_some() || self.audio_file.is_some()
    }

    /// Does this record point at `filename` through either artifact field?
    pub fn references(&self, filename: &str) -> bool {
        self.text_file.as_deref() == Some(filename) || self.audio_file.as_deref() == Some(filename)
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }
}

/// A record together with the key it is stored under.
///
/// Serializes flat (`{"id": key, "text": ..., ...}`) for API responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub data: RecordData,
}

impl Record {
    pub fn new(key: impl Into<String>, mut data: RecordData) -> Self {
        // the key is authoritative; the stored id field would serialize twice
        data.id = None;
        Self { id: key.into(), data }
    }
}

/// How [`Document::lookup`] found a record for a filename.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MatchSource {
    /// The filename is itself a record key (or an alias to one).
    DirectMatch,
    /// A record lists the filename as its `textFile` or `audioFile`.
    LinkedEntry {
        #[serde(rename = "entryId")]
        entry_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordMatch {
    pub source: MatchSource,
    pub record: Record,
}

/// The whole transcription document, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    entries: IndexMap<String, Entry>,
}

impl Document {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Raw access to a top-level value, without alias resolution.
    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn insert_record(&mut self, key: impl Into<String>, data: RecordData) {
        self.entries.insert(key.into(), Entry::Record(data));
    }

    pub fn insert_alias(&mut self, key: impl Into<String>, target: impl Into<String>) {
        self.entries.insert(key.into(), Entry::Alias(target.into()));
    }

    /// Remove a key, keeping the order of everything else.
    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        self.entries.shift_remove(key)
    }

    /// Look up `key`, following an alias at most one level.
    ///
    /// An alias that points at another alias (or at nothing) resolves to
    /// `None`; chains are never walked, so a malformed cycle cannot loop.
    pub fn get(&self, key: &str) -> Option<Record> {
        match self.entries.get(key)? {
            Entry::Record(data) => Some(Record::new(key, data.clone())),
            Entry::Alias(target) => match self.entries.get(target.as_str())? {
                Entry::Record(data) => Some(Record::new(target.clone(), data.clone())),
                _ => None,
            },
            Entry::Opaque(_) => None,
        }
    }

    /// Every record-valued entry, in stored order. Restartable: each call
    /// starts a fresh pass.
    pub fn records(&self) -> impl Iterator<Item = (&str, &RecordData)> + '_ {
        self.entries.iter().filter_map(|(key, entry)| match entry {
            Entry::Record(data) => Some((key.as_str(), data)),
            _ => None,
        })
    }

    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = (&str, &mut RecordData)> + '_ {
        self.entries.iter_mut().filter_map(|(key, entry)| match entry {
            Entry::Record(data) => Some((key.as_str(), data)),
            _ => None,
        })
    }

    /// Every alias as `(alias key, target key)`.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().filter_map(|(key, entry)| match entry {
            Entry::Alias(target) => Some((key.as_str(), target.as_str())),
            _ => None,
        })
    }

    /// Alias keys whose target is missing or not a record.
    pub fn dangling_aliases(&self) -> Vec<String> {
        self.aliases()
            .filter(|(_, target)| !matches!(self.entries.get(*target), Some(Entry::Record(_))))
            .map(|(key, _)| key.to_string())
            .collect()
    }

    /// Linear scan for the first record whose `textFile` or `audioFile`
    /// equals `filename`.
    pub fn find_by_artifact(&self, filename: &str) -> Option<Record> {
        self.records()
            .find(|(_, data)| data.references(filename))
            .map(|(key, data)| Record::new(key, data.clone()))
    }

    /// Direct key match first, then a linked-entry scan.
    pub fn lookup(&self, filename: &str) -> Option<RecordMatch> {
        if let Some(record) = self.get(filename) {
            return Some(RecordMatch {
                source: MatchSource::DirectMatch,
                record,
            });
        }

        self.find_by_artifact(filename).map(|record| RecordMatch {
            source: MatchSource::LinkedEntry {
                entry_id: record.id.clone(),
            },
            record,
        })
    }
}
