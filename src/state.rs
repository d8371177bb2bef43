//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data<AppState>`.
//!
//! ## Ownership:
//! - **config**: immutable after startup, so a plain `Arc<AppConfig>`
//! - **metrics**: updated by middleware on every request, `Arc<RwLock<_>>`
//! - **files / records / links / retrieval**: the storage and search
//!   components, each behind an `Arc` so cloning the state is cheap
//! - **transcriber**: a trait object so tests can swap in a double
//!
//! The record store carries its own async writer lock; nothing in this
//! module serializes document access.
//!
//! ## Rust Concepts:
//! - **Arc<dyn Trait>**: shared ownership of a value whose concrete type is
//!   chosen at startup
//! - **RwLock poisoning**: a panic while holding a metrics lock must not take
//!   the server down, so poisoned locks are recovered with `into_inner`

use crate::config::AppConfig;
use crate::links::LinkMaintainer;
use crate::retrieval::RetrievalEngine;
use crate::storage::{FileStore, RecordStore};
use crate::transcription::{ProcessTranscriber, Transcriber};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Request and transcription counters
    pub metrics: Arc<RwLock<AppMetrics>>,

    pub files: Arc<FileStore>,
    pub records: Arc<RecordStore>,
    pub links: Arc<LinkMaintainer>,
    pub retrieval: Arc<RetrievalEngine>,
    pub transcriber: Arc<dyn Transcriber>,

    /// When the server started
    pub start_time: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("files", &self.files)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

/// Metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of 4xx/5xx responses since server start
    pub error_count: u64,

    pub transcriptions_completed: u64,
    pub transcriptions_failed: u64,

    /// Per-route statistics, keyed by `"<METHOD> <route pattern>"`
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single route.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

impl AppState {
    /// Wire up the storage components from `config` with the process-backed
    /// transcriber.
    pub fn new(config: AppConfig) -> Self {
        let transcriber = Arc::new(ProcessTranscriber::from_config(&config.transcription));
        Self::with_transcriber(config, transcriber)
    }

    /// Same as [`AppState::new`] with an explicit transcriber.
    pub fn with_transcriber(config: AppConfig, transcriber: Arc<dyn Transcriber>) -> Self {
        let files = Arc::new(FileStore::new(config.storage.upload_dir.clone()));
        let records = Arc::new(RecordStore::new(config.storage.document_path.clone()));
        let links = Arc::new(LinkMaintainer::new(Arc::clone(&files), Arc::clone(&records)));
        let retrieval = Arc::new(RetrievalEngine::new(Arc::clone(&records)));

        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            files,
            records,
            links,
            retrieval,
            transcriber,
            start_time: Instant::now(),
        }
    }

    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    /// Count the outcome of one call to the transcriber.
    pub fn record_transcription(&self, success: bool) {
        let mut metrics = self.metrics_write();
        if success {
            metrics.transcriptions_completed += 1;
        } else {
            metrics.transcriptions_failed += 1;
        }
    }

    /// Record timing and outcome for one request to `endpoint`.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Copy of the current metrics, so the lock is not held while a
    /// response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, `0.0..=1.0`.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
