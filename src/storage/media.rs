//! Filename-driven helpers: content types, coarse file kinds, display sizes.
//!
//! Artifact names are opaque identifiers; the extension is only ever used to
//! pick a `Content-Type` and to group files in listings.

use std::path::Path;

/// Lowercased extension including the leading dot (`".webm"`), or `""`.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Content type for an artifact, from a fixed extension table.
pub fn mime_type(filename: &str) -> &'static str {
    match extension_of(filename).as_str() {
        ".mp3" => "audio/mpeg",
        ".wav" => "audio/wav",
        ".ogg" => "audio/ogg",
        ".m4a" => "audio/mp4",
        ".webm" => "audio/webm",
        ".flac" => "audio/flac",
        ".aac" => "audio/aac",
        ".txt" => "text/plain",
        ".json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Coarse grouping used by the file listing summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Audio,
    Text,
    Image,
    Other,
}

pub fn file_kind(filename: &str) -> FileKind {
    match extension_of(filename).as_str() {
        ".mp3" | ".wav" | ".m4a" | ".ogg" | ".flac" | ".aac" | ".webm" | ".mp4" | ".m4v" => {
            FileKind::Audio
        }
        ".txt" | ".json" | ".csv" | ".xml" | ".html" | ".htm" | ".md" => FileKind::Text,
        ".jpg" | ".jpeg" | ".png" | ".gif" | ".bmp" | ".svg" | ".webp" => FileKind::Image,
        _ => FileKind::Other,
    }
}

/// Human-readable size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2.25 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    // two decimals, trailing zeros dropped
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
