use crate::error::AppResult;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// List every registered backend with its availability and status.
pub async fn list_backends(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "default": state.registry.default_kind().to_string(),
        "backends": state.registry.list()
    })))
}
