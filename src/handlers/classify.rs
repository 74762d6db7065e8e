//! # Classification Handler
//!
//! The main endpoint of the service: accepts a source URL, runs the
//! blocking pipeline on actix's blocking pool, and returns the uniform
//! result record. Stage failures surface as stage-tagged JSON errors with
//! the status codes defined in the error module.

use crate::error::{AppError, AppResult};
use crate::pipeline::SourceReference;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Request body for the classify endpoint.
#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    /// Source URL of the media to classify
    pub url: String,

    /// Backend to use; omitted means the configured default
    #[serde(default)]
    pub backend: Option<String>,
}

pub async fn classify(
    state: web::Data<AppState>,
    body: web::Json<ClassifyRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let request_id = Uuid::new_v4().to_string();
    let start_time = Instant::now();

    if request.url.trim().is_empty() {
        return Err(AppError::BadRequest("Field 'url' must not be empty".to_string()));
    }

    let source = SourceReference::parse(&request.url)?;
    let backend = state.registry.select(request.backend.as_deref())?;

    info!(
        request_id = %request_id,
        url = %source.url,
        backend = backend.name(),
        "Classification request accepted"
    );

    state.increment_active_classifications();

    // The pipeline blocks on network, subprocesses, and inference, so it
    // runs on the blocking pool rather than a worker thread.
    let pipeline = state.pipeline.clone();
    let outcome = web::block(move || pipeline.run(&source, backend.as_ref())).await;

    state.decrement_active_classifications();

    let result = outcome
        .map_err(|e| AppError::Internal(format!("Blocking task failed: {}", e)))??;

    let duration_ms = start_time.elapsed().as_millis() as u64;

    Ok(HttpResponse::Ok().json(json!({
        "request_id": request_id,
        "result": {
            "label": result.label,
            "confidence": round_confidence(result.confidence),
            "transcript": result.transcript,
            "backend_name": result.backend_name,
        },
        "duration_ms": duration_ms,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Round a confidence percentage to two decimal places for the response.
fn round_confidence(confidence: f32) -> f32 {
    (confidence * 100.0).round() / 100.0
}
