//! # Transcript Vault - Main Application Entry Point
//!
//! HTTP backend that stores audio uploads and their transcriptions on disk,
//! keeps a single JSON document linking them, and answers questions over the
//! saved text.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: every handler and storage operation is asynchronous
//! - **modules**: code is organized into separate modules (mod statements)
//! - **Result<T, E>**: errors propagate with `?` up to the HTTP boundary
//! - **Arc & Mutex**: storage components are shared across worker threads
//!
//! ## Application Architecture:
//! - **config**: configuration (defaults, optional `config.toml`, environment)
//! - **state**: shared application state and metrics
//! - **storage**: upload directory, the transcription document and its store
//! - **links**: keeps the document consistent when artifacts are deleted
//! - **retrieval**: question answering over saved transcriptions
//! - **transcription**: the external transcription process
//! - **health**: health and metrics endpoints
//! - **middleware**: request logging and metrics
//! - **handlers**: HTTP request handlers for API endpoints
//! - **error**: error types and HTTP error responses

mod config;
mod error;
mod handlers;
mod health;
mod links;
mod middleware;
mod retrieval;
mod state;
mod storage;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use state::AppState;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging** for debugging and monitoring
/// 3. **Prepares storage**: creates the upload directory, checks the document
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** on Ctrl+C / SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    // .ok(): a missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;
    error::expose_internal_details(config.is_development());

    info!("Starting transcript-vault v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        upload_dir = %config.storage.upload_dir.display(),
        document = %config.storage.document_path.display(),
        environment = %config.environment,
        "Configuration loaded"
    );

    let app_state = AppState::new(config.clone());
    app_state
        .files
        .ensure_root()
        .await
        .with_context(|| format!("Failed to create upload directory {}", config.storage.upload_dir.display()))?;

    let document_status = app_state.records.status().await;
    info!(status = ?document_status, "Transcription document checked");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // middleware runs in reverse order of registration for requests
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(web::scope("/api").configure(handlers::configure))
            .route("/health", web::get().to(health::health_check))
            .default_service(web::to(handlers::not_found))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: what gets logged (e.g. "debug", "transcript_vault=trace")
/// - If not set, defaults to "transcript_vault=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcript_vault=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}

/// Resolves on Ctrl+C, or on SIGTERM where available.
///
/// A handler that cannot be installed is logged and ignored; the other
/// signal still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
