//! # Error Handling
//!
//! Two error layers live here:
//!
//! - [`PipelineError`]: the domain error for the classification pipeline.
//!   Every stage failure is mapped to exactly one variant, and the cause
//!   reported by the failing collaborator is preserved verbatim.
//! - [`AppError`]: the HTTP-facing error type. It wraps pipeline failures
//!   and the usual request-level problems, and converts everything into a
//!   consistent JSON error body via actix's `ResponseError` trait.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Failure of one pipeline stage.
///
/// ## Variants:
/// - **ResolutionFailed**: the source URL could not be turned into a local
///   media file (network error, non-2xx status, extractor failure).
/// - **TranscodeFailed**: the raw asset could not be normalized to canonical
///   audio (no audio track, unrecognized container, transcoder exit != 0).
/// - **BackendUnavailable**: the requested classification backend is not
///   loaded (model download/load failed, prototype file missing).
/// - **InferenceFailed**: the backend accepted the audio but could not
///   produce a result (tensor errors, empty transcript).
///
/// Each variant carries the underlying cause as reported by the failing
/// component. A failed stage never yields a partial result.
#[derive(Debug)]
pub enum PipelineError {
    ResolutionFailed(String),
    TranscodeFailed(String),
    BackendUnavailable(String),
    InferenceFailed(String),
}

impl PipelineError {
    /// The pipeline stage this error originated from, for logs and the
    /// JSON error body.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::ResolutionFailed(_) => "resolution",
            PipelineError::TranscodeFailed(_) => "normalization",
            PipelineError::BackendUnavailable(_) => "backend_selection",
            PipelineError::InferenceFailed(_) => "inference",
        }
    }

    /// The underlying cause as reported by the failing collaborator.
    pub fn cause(&self) -> &str {
        match self {
            PipelineError::ResolutionFailed(msg)
            | PipelineError::TranscodeFailed(msg)
            | PipelineError::BackendUnavailable(msg)
            | PipelineError::InferenceFailed(msg) => msg,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::ResolutionFailed(msg) => write!(f, "Asset resolution failed: {}", msg),
            PipelineError::TranscodeFailed(msg) => write!(f, "Audio normalization failed: {}", msg),
            PipelineError::BackendUnavailable(msg) => write!(f, "Backend unavailable: {}", msg),
            PipelineError::InferenceFailed(msg) => write!(f, "Inference failed: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Application-level errors returned from HTTP handlers.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500
/// - BadRequest/ValidationError → 400
/// - NotFound → 404
/// - Pipeline(ResolutionFailed) → 502 (upstream fetch failed)
/// - Pipeline(TranscodeFailed) → 422 (asset not processable)
/// - Pipeline(BackendUnavailable) → 503
/// - Pipeline(InferenceFailed) → 500
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (model state, blocking pool failures, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),

    /// A pipeline stage failed; carries the stage and cause
    Pipeline(PipelineError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Pipeline(err) => write!(f, "{}", err),
        }
    }
}

/// Converts application errors into the JSON error responses clients see.
///
/// All errors share one body shape:
/// ```json
/// {
///   "error": {
///     "type": "transcode_failed",
///     "stage": "normalization",
///     "message": "ffmpeg exited with status 1: ...",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
/// The `stage` field is present only for pipeline failures, so clients can
/// tell which stage rejected their request without parsing the message.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, stage, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                None,
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                None,
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                None,
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                None,
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                None,
                msg.clone(),
            ),
            AppError::Pipeline(err) => {
                let (status, error_type) = match err {
                    PipelineError::ResolutionFailed(_) => (
                        actix_web::http::StatusCode::BAD_GATEWAY,
                        "resolution_failed",
                    ),
                    PipelineError::TranscodeFailed(_) => (
                        actix_web::http::StatusCode::UNPROCESSABLE_ENTITY,
                        "transcode_failed",
                    ),
                    PipelineError::BackendUnavailable(_) => (
                        actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
                        "backend_unavailable",
                    ),
                    PipelineError::InferenceFailed(_) => (
                        actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                        "inference_failed",
                    ),
                };
                (status, error_type, Some(err.stage()), err.cause().to_string())
            }
        };

        let mut error_body = json!({
            "type": error_type,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        if let Some(stage) = stage {
            error_body["stage"] = json!(stage);
        }

        HttpResponse::build(status).json(json!({ "error": error_body }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(
            PipelineError::ResolutionFailed("x".to_string()).stage(),
            "resolution"
        );
        assert_eq!(
            PipelineError::TranscodeFailed("x".to_string()).stage(),
            "normalization"
        );
        assert_eq!(
            PipelineError::BackendUnavailable("x".to_string()).stage(),
            "backend_selection"
        );
        assert_eq!(
            PipelineError::InferenceFailed("x".to_string()).stage(),
            "inference"
        );
    }

    #[test]
    fn test_cause_is_preserved() {
        let err = PipelineError::TranscodeFailed("ffmpeg exited with status 1".to_string());
        assert_eq!(err.cause(), "ffmpeg exited with status 1");
        assert!(err.to_string().contains("ffmpeg exited with status 1"));
    }

    #[test]
    fn test_pipeline_error_status_codes() {
        let resp = AppError::Pipeline(PipelineError::ResolutionFailed("down".into()))
            .error_response();
        assert_eq!(resp.status().as_u16(), 502);

        let resp = AppError::Pipeline(PipelineError::TranscodeFailed("bad".into()))
            .error_response();
        assert_eq!(resp.status().as_u16(), 422);

        let resp = AppError::Pipeline(PipelineError::BackendUnavailable("off".into()))
            .error_response();
        assert_eq!(resp.status().as_u16(), 503);

        let resp = AppError::Pipeline(PipelineError::InferenceFailed("nan".into()))
            .error_response();
        assert_eq!(resp.status().as_u16(), 500);
    }
}
