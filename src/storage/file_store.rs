//! # File Store
//!
//! Owns the flat upload directory. Every user-supplied filename goes through
//! [`FileStore::resolve`] first, which strips directory components so that a
//! request for `../../etc/passwd` can only ever address `uploads/passwd`.
//!
//! ## Byte streaming:
//! [`FileStore::open_range`] returns a [`FileBody`] whose stream owns the
//! open file handle. When actix drops the response body (for example because
//! the client disconnected), the stream and the handle go with it.
//!
//! No lock is taken here: byte streaming is independent per request and
//! names are unique (timestamp + random suffix), so last-writer-wins on the
//! same name is acceptable.

use crate::error::{AppError, AppResult};
use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

/// Read size for streamed responses.
const STREAM_CHUNK_BYTES: usize = 64 * 1024;

/// A filename that has been stripped of directory components and joined
/// onto the upload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePath {
    name: String,
    path: PathBuf,
}

impl SafePath {
    /// The bare filename (what the document stores in `textFile`/`audioFile`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Size and timestamps of a stored artifact.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileStat {
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
}

/// One entry of [`FileStore::list`].
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub name: String,
    pub stat: FileStat,
}

/// An inclusive byte range `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Parse a `Range` request header against a file of `size` bytes.
///
/// Accepts `bytes=start-end`, `bytes=start-` (open end) and `bytes=-suffix`
/// (last `suffix` bytes). Multi-range requests and anything unparsable are
/// rejected with `RangeNotSatisfiable` rather than silently served in full.
pub fn parse_range(header: &str, size: u64) -> AppResult<ByteRange> {
    let unsatisfiable = || AppError::RangeNotSatisfiable {
        range: header.to_string(),
        size,
    };

    let spec = header.trim().strip_prefix("bytes=").ok_or_else(unsatisfiable)?;
    if spec.contains(',') {
        return Err(unsatisfiable());
    }

    let (start_str, end_str) = spec.split_once('-').ok_or_else(unsatisfiable)?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    let (start, end) = match (start_str.is_empty(), end_str.is_empty()) {
        (false, false) => (
            start_str.parse::<u64>().map_err(|_| unsatisfiable())?,
            end_str.parse::<u64>().map_err(|_| unsatisfiable())?,
        ),
        (false, true) => {
            let start = start_str.parse::<u64>().map_err(|_| unsatisfiable())?;
            (start, size.saturating_sub(1))
        }
        (true, false) => {
            let suffix = end_str.parse::<u64>().map_err(|_| unsatisfiable())?;
            if suffix == 0 {
                return Err(unsatisfiable());
            }
            (size.saturating_sub(suffix), size.saturating_sub(1))
        }
        (true, true) => return Err(unsatisfiable()),
    };

    validate_range(start, end, size).map_err(|_| unsatisfiable())
}

/// `0 <= start <= end < size`
fn validate_range(start: u64, end: u64, size: u64) -> AppResult<ByteRange> {
    if size == 0 || start > end || end >= size {
        return Err(AppError::RangeNotSatisfiable {
            range: format!("bytes={}-{}", start, end),
            size,
        });
    }
    Ok(ByteRange { start, end })
}

/// A file (or a slice of one) ready to be streamed.
pub struct FileBody {
    /// `Some` for partial content.
    pub range: Option<ByteRange>,
    /// Full size of the underlying file.
    pub total: u64,
    pub stream: BoxStream<'static, io::Result<Bytes>>,
}

impl FileBody {
    /// Number of bytes the stream will yield.
    pub fn content_length(&self) -> u64 {
        self.range.map(|r| r.len()).unwrap_or(self.total)
    }
}

/// Owner of the upload directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the upload directory if it does not exist yet.
    pub async fn ensure_root(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Strip directory components from `raw_name` and join it to the root.
    ///
    /// Both `/` and `\` count as separators so that Windows-style traversal
    /// attempts are neutralised on every platform.
    pub fn resolve(&self, raw_name: &str) -> AppResult<SafePath> {
        let name = raw_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();

        if name.is_empty() || name == "." || name == ".." {
            return Err(AppError::InvalidInput("Filename is required".to_string()));
        }

        Ok(SafePath {
            name: name.to_string(),
            path: self.root.join(name),
        })
    }

    pub async fn exists(&self, file: &SafePath) -> bool {
        tokio::fs::metadata(file.path())
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    pub async fn stat(&self, file: &SafePath) -> AppResult<FileStat> {
        let meta = tokio::fs::metadata(file.path())
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => AppError::not_found(format!("File not found: {}", file.name())),
                _ => AppError::from(e),
            })?;

        if !meta.is_file() {
            return Err(AppError::not_found(format!("File not found: {}", file.name())));
        }

        Ok(FileStat {
            size: meta.len(),
            modified_at: meta.modified().map(DateTime::<Utc>::from)?,
            created_at: meta.created().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Open `file` for streaming, optionally restricted to `start..=end`.
    ///
    /// With only `start`, the range runs to the end of the file. A range that
    /// does not satisfy `0 <= start <= end < size` fails with
    /// `RangeNotSatisfiable` before any byte is read.
    pub async fn open_range(
        &self,
        file: &SafePath,
        start: Option<u64>,
        end: Option<u64>,
    ) -> AppResult<FileBody> {
        let stat = self.stat(file).await?;
        let total = stat.size;

        let range = match (start, end) {
            (None, None) => None,
            (Some(start), end) => Some(validate_range(start, end.unwrap_or(total.saturating_sub(1)), total)?),
            (None, Some(end)) => Some(validate_range(0, end, total)?),
        };

        let mut handle = tokio::fs::File::open(file.path()).await?;
        let length = match range {
            Some(r) => {
                handle.seek(SeekFrom::Start(r.start)).await?;
                r.len()
            }
            None => total,
        };

        debug!(filename = %file.name(), ?range, total, "Opening file stream");

        Ok(FileBody {
            range,
            total,
            stream: chunked(handle.take(length)),
        })
    }

    /// Open with a parsed `Range` header value, if any.
    pub async fn open_with_header(&self, file: &SafePath, range_header: Option<&str>) -> AppResult<FileBody> {
        match range_header {
            Some(header) => {
                let total = self.stat(file).await?.size;
                let range = parse_range(header, total)?;
                self.open_range(file, Some(range.start), Some(range.end)).await
            }
            None => self.open_range(file, None, None).await,
        }
    }

    pub async fn read_to_string(&self, file: &SafePath) -> AppResult<String> {
        tokio::fs::read_to_string(file.path()).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => AppError::not_found(format!("File not found: {}", file.name())),
            _ => AppError::from(e),
        })
    }

    /// Write `bytes` to `file`, creating the upload directory if needed.
    pub async fn write(&self, file: &SafePath, bytes: &[u8]) -> AppResult<()> {
        if let Some(parent) = file.path().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(file.path(), bytes).await?;
        info!(filename = %file.name(), size = bytes.len(), "Artifact written");
        Ok(())
    }

    /// Create (or truncate) `file` for incremental writes such as multipart
    /// uploads.
    pub async fn create(&self, file: &SafePath) -> AppResult<tokio::fs::File> {
        self.ensure_root().await?;
        Ok(tokio::fs::File::create(file.path()).await?)
    }

    /// Best-effort removal used when cleaning up after a failed request.
    pub async fn remove_quietly(&self, file: &SafePath) {
        match tokio::fs::remove_file(file.path()).await {
            Ok(()) => debug!(filename = %file.name(), "Removed partial artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(filename = %file.name(), error = %e, "Failed to clean up artifact"),
        }
    }

    /// Remove `file`. Fails with `NotFound` if it is already gone.
    pub async fn delete(&self, file: &SafePath) -> AppResult<()> {
        match tokio::fs::remove_file(file.path()).await {
            Ok(()) => {
                info!(filename = %file.name(), "Artifact deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(AppError::not_found(format!("File not found: {}", file.name())))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every regular file in the upload directory, newest first.
    pub async fn list(&self) -> AppResult<Vec<StoredFile>> {
        self.ensure_root().await?;

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            files.push(StoredFile {
                name,
                stat: FileStat {
                    size: meta.len(),
                    modified_at: meta.modified().map(DateTime::<Utc>::from)?,
                    created_at: meta.created().ok().map(DateTime::<Utc>::from),
                },
            });
        }

        files.sort_by(|a, b| b.stat.modified_at.cmp(&a.stat.modified_at));
        Ok(files)
    }

    /// A fresh collision-resistant upload name: `<millis>-<random>.<ext>`.
    pub fn unique_name(&self, extension: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() {
            format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
        } else {
            format!("{}-{}.{}", Utc::now().timestamp_millis(), &suffix[..8], extension)
        }
    }
}

/// Turn a bounded reader into a stream of chunks. The stream ends after the
/// first error.
fn chunked<R>(reader: R) -> BoxStream<'static, io::Result<Bytes>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = vec![0u8; STREAM_CHUNK_BYTES];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}
