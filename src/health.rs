use crate::state::{AppMetrics, AppState};
use crate::storage::DocumentStatus;
use actix_web::{web, HttpResponse};
use serde_json::json;

fn error_rate(metrics: &AppMetrics) -> f64 {
    if metrics.request_count > 0 {
        metrics.error_count as f64 / metrics.request_count as f64
    } else {
        0.0
    }
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = &state.config;
    let uptime_seconds = state.get_uptime_seconds();

    let document_status = state.records.status().await;
    let upload_dir_ready = tokio::fs::metadata(state.files.root())
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);

    // corrupt document: reads still succeed (as empty)
    let status = match (&document_status, upload_dir_ready) {
        (DocumentStatus::Corrupt, _) | (_, false) => "degraded",
        _ => "healthy",
    };

    HttpResponse::Ok().json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port,
            "environment": config.environment
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": error_rate(&metrics),
            "transcriptions_completed": metrics.transcriptions_completed,
            "transcriptions_failed": metrics.transcriptions_failed
        },
        "storage": {
            "upload_dir": state.files.root().display().to_string(),
            "upload_dir_ready": upload_dir_ready,
            "document_path": state.records.path().display().to_string(),
            "document_status": document_status
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": error_rate(&metrics),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "transcription": {
            "completed": metrics.transcriptions_completed,
            "failed": metrics.transcriptions_failed,
            "timeout_secs": state.config.transcription.timeout_secs
        },
        "endpoints": endpoint_stats
    }))
}
