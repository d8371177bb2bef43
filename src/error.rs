//! # Error Handling
//!
//! Every failure the vault can produce is one variant of [`AppError`]. The
//! storage components return these directly so that handlers can bubble them
//! up with `?` and let actix turn them into JSON responses.
//!
//! ## Error taxonomy:
//! - **InvalidInput**: missing or empty text / filename (400)
//! - **NotFound**: missing file or record (404)
//! - **RangeNotSatisfiable**: malformed or out-of-bounds byte range (416)
//! - **Corrupt**: the JSON document failed to parse (500 if it ever reaches a client)
//! - **ExternalToolFailure**: the transcription process errored (500)
//! - **Timeout**: the transcription process ran past its deadline (408)
//! - **Internal**: anything else (500, detail hidden outside development)
//! - **ConfigError**: configuration problems at startup (500)
//!
//! ## Rust Concepts:
//! - **From trait**: lets `?` convert io/serde/config errors automatically
//! - **ResponseError trait**: converts errors to HTTP responses
//! - **Display trait**: human-readable messages for logs

use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether `Internal` error messages are sent to clients.
///
/// Set once at startup from `AppConfig::is_development()`. Stored as a static
/// because `ResponseError::error_response` has no access to application state.
static EXPOSE_INTERNAL_DETAILS: AtomicBool = AtomicBool::new(false);

/// Enable or disable internal error detail in HTTP responses.
pub fn expose_internal_details(enabled: bool) {
    EXPOSE_INTERNAL_DETAILS.store(enabled, Ordering::SeqCst);
}

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::InvalidInput("No text provided or text is empty".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// The client sent missing or malformed input
    InvalidInput(String),

    /// Requested file or record does not exist
    NotFound(String),

    /// The requested byte range cannot be served from a file of `size` bytes
    RangeNotSatisfiable { range: String, size: u64 },

    /// The transcription document could not be parsed
    Corrupt(String),

    /// The external transcription process failed
    ExternalToolFailure(String),

    /// The external transcription process exceeded its deadline
    Timeout(String),

    /// Internal server errors (I/O failures, serialization bugs, etc.)
    Internal(String),

    /// Configuration file or environment variable problems
    ConfigError(String),
}

impl AppError {
    /// Shorthand used all over the storage layer.
    pub fn not_found(what: impl fmt::Display) -> Self {
        AppError::NotFound(what.to_string())
    }

    /// Machine-readable error type and HTTP status for this error.
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::RangeNotSatisfiable { .. } => {
                (StatusCode::RANGE_NOT_SATISFIABLE, "range_not_satisfiable")
            }
            AppError::Corrupt(_) => (StatusCode::INTERNAL_SERVER_ERROR, "corrupt_document"),
            AppError::ExternalToolFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "transcription_failed")
            }
            AppError::Timeout(_) => (StatusCode::REQUEST_TIMEOUT, "transcription_timeout"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
        }
    }

    /// The message sent to clients. Internal details are suppressed unless
    /// the server runs in development mode.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(msg) | AppError::Corrupt(msg) => {
                if EXPOSE_INTERNAL_DETAILS.load(Ordering::SeqCst) {
                    msg.clone()
                } else {
                    "Internal server error".to_string()
                }
            }
            AppError::RangeNotSatisfiable { range, size } => {
                format!("Range '{}' cannot be satisfied for {} bytes", range, size)
            }
            AppError::InvalidInput(msg)
            | AppError::NotFound(msg)
            | AppError::ExternalToolFailure(msg)
            | AppError::Timeout(msg)
            | AppError::ConfigError(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::RangeNotSatisfiable { range, size } => {
                write!(f, "Range not satisfiable: {} (size {})", range, size)
            }
            AppError::Corrupt(msg) => write!(f, "Corrupt document: {}", msg),
            AppError::ExternalToolFailure(msg) => write!(f, "Transcription failed: {}", msg),
            AppError::Timeout(msg) => write!(f, "Transcription timed out: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts our errors into HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "not_found",
///     "message": "File not found: 1712-abc.webm",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
///
/// A 416 additionally carries `Content-Range: bytes */<size>` as RFC 9110 asks.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.classify().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type) = self.classify();

        let mut builder = HttpResponse::build(status);
        if let AppError::RangeNotSatisfiable { size, .. } = self {
            builder.insert_header((header::CONTENT_RANGE, format!("bytes */{}", size)));
        }

        builder.json(json!({
            "error": {
                "type": error_type,
                "message": self.public_message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON errors at the API boundary are almost always the client's fault.
/// The storage layer maps its own parse failures to `Corrupt` explicitly.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// I/O errors keep their `NotFound` meaning; everything else is internal.
impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => AppError::NotFound(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
