use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

fn config_body(config: &crate::config::AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "backend": {
            "default": config.backend.default,
            "whisper_model": config.backend.whisper_model,
            "prototype_file": config.backend.prototype_file,
            "device": config.backend.device
        },
        "resolver": {
            "download_timeout_secs": config.resolver.download_timeout_secs,
            "extractor_binary": config.resolver.extractor_binary
        },
        "transcoder": {
            "binary": config.transcoder.binary
        },
        "stt": {
            "binary": config.stt.binary,
            "model": config.stt.model,
            "language": config.stt.language
        },
        "performance": {
            "max_concurrent_requests": config.performance.max_concurrent_requests,
            "scratch_dir": config.performance.scratch_dir
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_body(&config)
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_body(&current_config)
    })))
}
