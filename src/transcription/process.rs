//! Process-backed transcriber.
//!
//! The child is spawned with `kill_on_drop`, so when the deadline expires
//! and the wait future is dropped the process is killed as well. Nothing
//! else is propagated into the child: a client that disconnects early does
//! not stop a running transcription.

use super::{Transcriber, TranscriptionResult};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ProcessTranscriber {
    program: String,
    script: Option<PathBuf>,
}

impl ProcessTranscriber {
    pub fn new(program: impl Into<String>, script: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script,
        }
    }

    pub fn from_config(config: &crate::config::TranscriptionConfig) -> Self {
        Self::new(config.program.clone(), config.script.clone())
    }
}

#[async_trait]
impl Transcriber for ProcessTranscriber {
    async fn transcribe(&self, audio: &Path, timeout: Duration) -> AppResult<TranscriptionResult> {
        let started = Instant::now();

        let mut command = tokio::process::Command::new(&self.program);
        if let Some(script) = &self.script {
            command.arg(script);
        }
        command
            .arg(audio)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, audio = %audio.display(), "Spawning transcriber");
        let child = command.spawn().map_err(|e| {
            error!(program = %self.program, error = %e, "Failed to spawn transcriber");
            AppError::ExternalToolFailure(format!("Failed to start {}: {}", self.program, e))
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AppError::ExternalToolFailure(format!(
                    "Transcriber wait failed: {}",
                    e
                )))
            }
            Err(_elapsed) => {
                warn!(audio = %audio.display(), timeout_secs = timeout.as_secs(), "Transcriber timed out");
                return Err(AppError::Timeout(
                    "Transcription timeout. File might be too long.".to_string(),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(status = %output.status, stderr = %stderr.trim(), "Transcriber exited with failure");
            return Err(AppError::ExternalToolFailure(format!(
                "Transcriber exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = parse_output(&String::from_utf8_lossy(&output.stdout));
        if text.is_empty() {
            return Err(AppError::ExternalToolFailure(
                "Transcriber produced no text".to_string(),
            ));
        }

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(audio = %audio.display(), chars = text.chars().count(), processing_time_ms, "Transcription complete");
        Ok(TranscriptionResult {
            text,
            processing_time_ms,
        })
    }
}

/// Plain text, a JSON string, or a JSON object with `transcription`/`text`.
pub fn parse_output(stdout: &str) -> String {
    let trimmed = stdout.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map
            .get("transcription")
            .or_else(|| map.get("text"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        Ok(Value::String(s)) => s.trim().to_string(),
        _ => trimmed.to_string(),
    }
}
