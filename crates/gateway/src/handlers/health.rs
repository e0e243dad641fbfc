//! Service status handlers

use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct RootResponse {
    pub service: String,
    pub status: &'static str,
    pub version: &'static str,
    pub vllm_url: String,
    pub model: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
}

/// Service banner with the inference backend in use
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        service: state.config.observability.service_name.clone(),
        status: "running",
        version: drunkenbot_common::VERSION,
        vllm_url: state.config.completion.url.clone(),
        model: state.completion.model().to_string(),
    })
}

/// Liveness probe - always returns healthy if server is running
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.config.observability.service_name.clone(),
        version: drunkenbot_common::VERSION,
    })
}
