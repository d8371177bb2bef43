//! # Storage
//!
//! Everything that touches disk lives here:
//!
//! - **file_store**: the flat upload directory (safe paths, byte ranges)
//! - **document**: the typed model of `transcriptions.json`
//! - **record_store**: locked read-modify-write access to that document
//! - **media**: content types and display helpers keyed on filenames

pub mod document;
pub mod file_store;
pub mod media;
pub mod record_store;

pub use document::{Document, MatchSource, Record, RecordData, LIVE_TRANSCRIPTION};
pub use file_store::{FileBody, FileStat, FileStore, SafePath};
pub use record_store::{DocumentStatus, LiveEntry, RecordStore};
