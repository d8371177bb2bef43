//! # Transcription Module
//!
//! Speech-to-text is delegated to an external program. This module defines
//! the capability the HTTP layer depends on and a process-backed
//! implementation of it.
//!
//! ## Key Components:
//! - **Transcriber**: async trait injected into `AppState`, so tests can
//!   substitute a double
//! - **ProcessTranscriber**: runs `program [script] <audio path>` under a
//!   deadline and parses its stdout

pub mod process;

use crate::error::AppResult;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub use process::ProcessTranscriber;

/// Result of a successful transcription.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TranscriptionResult {
    /// The transcribed text, trimmed
    pub text: String,

    /// Wall-clock time spent in the transcriber (milliseconds)
    pub processing_time_ms: u64,
}

/// Turns an audio file into text.
///
/// Implementations must give up once `timeout` has elapsed and report
/// `AppError::Timeout`; any other failure is `AppError::ExternalToolFailure`.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path, timeout: Duration) -> AppResult<TranscriptionResult>;
}
