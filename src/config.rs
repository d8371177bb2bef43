//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms set these)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_STORAGE__UPLOAD_DIR`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys use a double underscore so that field names which contain a
//! single underscore (`upload_dir`, `timeout_secs`) stay intact.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, storage, transcription)
/// keeps each component's constructor honest: it receives exactly the section
/// it needs instead of reaching for global paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub transcription: TranscriptionConfig,

    /// `development` exposes internal error details to clients.
    pub environment: String,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where artifacts and the transcription document live.
///
/// ## Fields:
/// - `upload_dir`: flat directory holding every audio and text artifact
/// - `document_path`: the single JSON document (`transcriptions.json`)
/// - `max_upload_bytes`: multipart uploads larger than this are rejected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub document_path: PathBuf,
    pub max_upload_bytes: usize,
}

/// External transcription process settings.
///
/// The command line is `program [script] <audio path>`; `script` is optional
/// so that a standalone binary can be configured as well as a Python script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub program: String,
    pub script: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl TranscriptionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("uploads"),
                document_path: PathBuf::from("transcriptions.json"),
                max_upload_bytes: 100 * 1024 * 1024, // 100MB, same as the upload route limit
            },
            transcription: TranscriptionConfig {
                program: "python".to_string(),
                script: Some(PathBuf::from("scripts/transcribe.py")),
                timeout_secs: 300, // five minutes
            },
            environment: "development".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_STORAGE__UPLOAD_DIR=/srv/uploads`: Override the upload directory
    /// - `APP_TRANSCRIPTION__TIMEOUT_SECS=120`: Shorter transcription deadline
    /// - `APP_ENVIRONMENT=production`: Hide internal error details
    /// - `HOST` / `PORT`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Storage paths are not empty
    /// - Upload limit and transcription timeout are positive
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Upload directory cannot be empty"));
        }

        if self.storage.document_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Document path cannot be empty"));
        }

        if self.storage.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.transcription.program.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcription program cannot be empty"));
        }

        if self.transcription.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Transcription timeout must be greater than 0"));
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}
