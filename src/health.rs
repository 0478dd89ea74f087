use crate::config::{PROJECT_NAME, VERSION};
use crate::SharedState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::json;

/// GET /
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": format!("Welcome to {}", PROJECT_NAME),
        "version": VERSION,
        "health": "/health",
    }))
}

/// GET /ping
pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "message": "pong" }))
}

/// GET /health
pub async fn health_check(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "version": VERSION,
        "project_name": PROJECT_NAME,
        "model_loaded": state.model.is_loaded(),
        "model_version": state.model.model_version(),
    }))
}

/// GET /models
pub async fn list_models(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let loaded = state.model.is_loaded();
    Json(json!({
        "models": [{
            "name": "alzheimer-detection-v1",
            "version": state.model.model_version(),
            "status": if loaded { "loaded" } else { "placeholder" },
            "description": "Alzheimer's disease detection model",
            "accuracy": if loaded { Some(0.894) } else { None },
            "is_placeholder": !loaded,
        }],
        "active_model": state.model.model_version(),
    }))
}
