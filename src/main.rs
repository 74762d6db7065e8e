//! # Accent Detector Backend - Main Application Entry Point
//!
//! HTTP service that classifies the accent or language of remotely hosted
//! media. A request names a source URL; the service downloads the media,
//! normalizes it to canonical audio, and classifies it with one of three
//! interchangeable backends.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML files + environment variables)
//! - **pipeline**: Resolution, normalization, and orchestration stages
//! - **backends**: The classification strategies and their registry
//! - **audio**: PCM and mel-spectrogram signal processing
//! - **state**: Shared application state and metrics
//! - **health**: System health monitoring endpoints
//! - **middleware**: Request processing logic (logging, metrics)
//! - **handlers**: HTTP request handlers for API endpoints
//! - **error**: Error types and HTTP error responses

mod audio;
mod backends;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod middleware;
mod pipeline;
mod state;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use backends::BackendRegistry;
use config::AppConfig;
use pipeline::{normalizer::AudioNormalizer, resolver::AssetResolver, Pipeline};
use state::AppState;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown flag set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!(
        "Starting accent-detector-backend v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    // Model loading happens here, once. Backends that fail to initialize
    // are reported as unavailable instead of aborting startup.
    let registry = BackendRegistry::initialize(&config);

    let scratch_dir = scratch_dir_from(&config);
    let resolver = AssetResolver::new(&config.resolver, scratch_dir.clone())
        .map_err(|e| anyhow::anyhow!("Failed to construct asset resolver: {}", e))?;
    let normalizer = AudioNormalizer::new(&config.transcoder, scratch_dir);
    let pipeline = Pipeline::new(resolver, normalizer);

    let app_state = AppState::new(config.clone(), registry, pipeline);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/classify", web::post().to(handlers::classify))
                    .route("/backends", web::get().to(handlers::list_backends))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Scratch directory for per-request media files; empty means the system
/// temp directory.
fn scratch_dir_from(config: &AppConfig) -> Option<PathBuf> {
    if config.performance.scratch_dir.is_empty() {
        None
    } else {
        Some(PathBuf::from(&config.performance.scratch_dir))
    }
}

/// Initialize structured logging for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged; defaults to
///   "accent_detector_backend=debug,actix_web=info" when unset.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accent_detector_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM and SIGINT and set the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag until it is set.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
